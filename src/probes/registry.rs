//! # Probe type registry: explicit, dependency-injected type table.
//!
//! [`ProbeKind`] is the registration record for one probe type: a factory
//! closure from configuration JSON to a probe instance, the type's default
//! schedule (plain data, supplied at registration time), and its delivery
//! mode. [`ProbeTypeRegistry`] is the table the coordinator consults; it is
//! an ordinary value passed in at construction — there are no global
//! singletons, and instance caching (keyed by identity) lives in the
//! coordinator with explicit eviction.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::RuntimeError;
use crate::identity::ProbeIdentity;
use crate::probes::probe::{Delivery, ProbeRef};
use crate::requests::Schedule;

/// Factory from optional configuration JSON to a probe instance.
pub type ProbeFactory =
    Arc<dyn Fn(Option<&Value>) -> Result<ProbeRef, RuntimeError> + Send + Sync>;

/// Registration record for one probe type.
#[derive(Clone)]
pub struct ProbeKind {
    name: Cow<'static, str>,
    factory: ProbeFactory,
    defaults: Schedule,
    delivery: Delivery,
}

impl ProbeKind {
    /// Creates a registration with default schedule parameters unset and
    /// continuous delivery.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        factory: impl Fn(Option<&Value>) -> Result<ProbeRef, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            defaults: Schedule::default(),
            delivery: Delivery::Continuous,
        }
    }

    /// Sets the type's default schedule (merged under each request).
    pub fn with_defaults(mut self, defaults: Schedule) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the delivery mode.
    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Returns the probe type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the type's default schedule.
    pub fn defaults(&self) -> &Schedule {
        &self.defaults
    }

    /// Returns the delivery mode.
    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    /// Builds the identity for this type under the given configuration.
    pub fn identity(&self, config: Option<&Value>) -> ProbeIdentity {
        match config {
            Some(cfg) => ProbeIdentity::with_config(self.name.to_string(), cfg),
            None => ProbeIdentity::new(self.name.to_string()),
        }
    }

    /// Instantiates a probe for the given configuration.
    pub fn build(&self, config: Option<&Value>) -> Result<ProbeRef, RuntimeError> {
        (self.factory)(config)
    }
}

impl std::fmt::Debug for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeKind")
            .field("name", &self.name)
            .field("delivery", &self.delivery)
            .finish()
    }
}

/// Table of registered probe types, keyed by type name.
#[derive(Default)]
pub struct ProbeTypeRegistry {
    kinds: HashMap<String, ProbeKind>,
}

impl ProbeTypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a probe type, replacing any previous registration with the
    /// same name.
    pub fn register(&mut self, kind: ProbeKind) -> &mut Self {
        self.kinds.insert(kind.name().to_string(), kind);
        self
    }

    /// Looks up a probe type by name.
    pub fn get(&self, name: &str) -> Option<&ProbeKind> {
        self.kinds.get(name)
    }

    /// Looks up a probe type, erroring when unknown.
    pub fn require(&self, name: &str) -> Result<&ProbeKind, RuntimeError> {
        self.kinds
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownProbeType {
                name: name.to_string(),
            })
    }

    /// Builds the identity for a named type under the given configuration.
    pub fn identity(
        &self,
        name: &str,
        config: Option<&Value>,
    ) -> Result<ProbeIdentity, RuntimeError> {
        Ok(self.require(name)?.identity(config))
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.kinds.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ProbeContext;
    use crate::ProbeError;
    use async_trait::async_trait;
    use serde_json::json;

    struct Dummy;

    #[async_trait]
    impl crate::probes::Probe for Dummy {
        fn name(&self) -> &str {
            "dummy"
        }

        async fn on_start(&self, _cx: &ProbeContext) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    fn kind() -> ProbeKind {
        ProbeKind::new("dummy", |_cfg| Ok(Arc::new(Dummy) as ProbeRef))
    }

    #[test]
    fn test_register_and_require() {
        let mut reg = ProbeTypeRegistry::new();
        reg.register(kind());

        assert!(reg.get("dummy").is_some());
        assert!(reg.require("dummy").is_ok());
        assert!(matches!(
            reg.require("nope"),
            Err(RuntimeError::UnknownProbeType { .. })
        ));
    }

    #[test]
    fn test_identity_through_registry() {
        let mut reg = ProbeTypeRegistry::new();
        reg.register(kind());

        let a = reg.identity("dummy", Some(&json!({"b": 1, "a": 2}))).unwrap();
        let b = reg.identity("dummy", Some(&json!({"a": 2, "b": 1}))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_factory_builds_instances() {
        let k = kind();
        let probe = k.build(None).unwrap();
        assert_eq!(probe.name(), "dummy");
    }

    #[test]
    fn test_registration_replaces_by_name() {
        let mut reg = ProbeTypeRegistry::new();
        reg.register(kind());
        reg.register(kind().with_delivery(Delivery::Terminal));

        assert_eq!(reg.get("dummy").unwrap().delivery(), Delivery::Terminal);
        assert_eq!(reg.names(), vec!["dummy"]);
    }
}
