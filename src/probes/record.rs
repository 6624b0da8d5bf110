//! # Data records: the delivery envelope for probe output.
//!
//! Every record a probe emits is stamped with the producing probe's identity
//! and a wall-clock timestamp (supplied by the record if present, else the
//! instant of emission) before fan-out. Fields are a flat, ordered
//! key→JSON-value map; the probe adapter decides what goes in.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One emitted data record.
///
/// Built by probe adapters with [`DataRecord::new`] and `with` field
/// setters; `probe` and `timestamp` are filled in by the delivery path.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DataRecord {
    /// Producing probe's identity URI. Stamped at emission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<String>,
    /// Wall-clock timestamp. Stamped at emission when the adapter leaves it
    /// unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<SystemTime>,
    /// Flat probe-specific fields, ordered by key.
    pub fields: BTreeMap<String, Value>,
}

impl DataRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing any previous value under the same key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Sets the record timestamp (otherwise stamped at emission).
    pub fn with_timestamp(mut self, at: SystemTime) -> Self {
        self.timestamp = Some(at);
        self
    }

    /// Returns a field value, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fields_are_ordered_by_key() {
        let record = DataRecord::new().with("z", 1).with("a", 2).with("m", 3);
        let keys: Vec<&str> = record.fields.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "m", "z"]);
    }

    #[test]
    fn test_with_replaces_value() {
        let record = DataRecord::new().with("x", 1).with("x", 2);
        assert_eq!(record.get("x"), Some(&json!(2)));
    }
}
