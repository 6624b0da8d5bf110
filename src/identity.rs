//! # Probe identity: type name plus canonical configuration.
//!
//! A probe instance is addressed by its [`ProbeIdentity`]: the probe type
//! name and the canonical JSON encoding of its configuration. Two
//! configurations with the same keys and values always produce the same
//! identity, regardless of key insertion order — the canonical form sorts
//! object keys recursively. The coordinator relies on this to cache exactly
//! one controller per logical probe.
//!
//! The display encoding is URI-like:
//! ```text
//! probe://location
//! probe://accelerometer/{"rate_hz":50,"sensitivity":"high"}
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// URI scheme used by the display encoding.
const SCHEME: &str = "probe";

/// Identity of a logical probe: `(type name, canonical config JSON)`.
///
/// Cheap to clone and hashable; equality is over the canonical form, so two
/// identities built from configurations that differ only in key order
/// compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbeIdentity {
    name: String,
    config: Option<String>,
}

impl ProbeIdentity {
    /// Creates an identity for a probe type with no configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: None,
        }
    }

    /// Creates an identity for a probe type with the given configuration.
    ///
    /// The configuration is canonicalized (object keys sorted recursively)
    /// before encoding, so insertion order never affects the identity.
    pub fn with_config(name: impl Into<String>, config: &Value) -> Self {
        Self {
            name: name.into(),
            config: Some(canonical_json(config)),
        }
    }

    /// Returns the probe type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the canonical configuration JSON, if any.
    pub fn config_json(&self) -> Option<&str> {
        self.config.as_deref()
    }

    /// Parses the canonical configuration back into a JSON value.
    ///
    /// Returns `None` when the identity carries no configuration. The
    /// canonical string is produced by this module, so parsing only fails if
    /// the identity was deserialized from tampered input.
    pub fn config(&self) -> Option<Value> {
        self.config
            .as_deref()
            .and_then(|c| serde_json::from_str(c).ok())
    }

    /// Returns the URI encoding, `probe://name[/configJson]`.
    pub fn uri(&self) -> String {
        match &self.config {
            Some(cfg) => format!("{SCHEME}://{}/{}", self.name, cfg),
            None => format!("{SCHEME}://{}", self.name),
        }
    }

    /// Returns the URI encoding as a shared string, for event metadata.
    pub fn uri_arc(&self) -> Arc<str> {
        Arc::from(self.uri())
    }
}

impl fmt::Display for ProbeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Encodes a JSON value with all object keys sorted, recursively.
///
/// `serde_json`'s default map is already ordered, but the canonical form must
/// not depend on a feature flag of a dependency, so sorting is explicit.
fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(&String, &Value)> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), canonicalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
