//! # Global runtime configuration.
//!
//! Provides [`RuntimeConfig`], centralized settings for probe drivers and
//! the coordinator.
//!
//! Config is used in two ways:
//! 1. **Coordinator creation**: `Coordinator::builder(config)`
//! 2. **Schedule fallback**: merged under each probe type's default schedule
//!
//! ## Sentinel values
//! - `grace = 0s` → hooks run without a timeout
//! - `bus_capacity` is clamped to a minimum of 1 by the bus

use std::time::Duration;

use crate::requests::Schedule;

/// Global configuration for the probevisor runtime.
///
/// Defines:
/// - **Hook discipline**: grace period before a hook is abandoned
/// - **Event system**: bus capacity for event delivery
/// - **Quiesce policy**: auto-disable when the listener registry empties
/// - **Schedule fallback**: defaults used when neither the request nor the
///   probe type supplies a parameter
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Maximum time a lifecycle hook may run before the driver abandons it
    /// and forces the probe to `Disabled`.
    ///
    /// Hooks are expected to return quickly and push long-running work onto
    /// the runtime under the run token; the grace only bounds wind-down.
    /// `Duration::ZERO` disables the timeout.
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages
    /// will receive `Lagged` and skip older items. Minimum value is 1
    /// (enforced by the bus).
    pub bus_capacity: usize,

    /// Whether a probe disables itself when its listener registry empties.
    ///
    /// This is the standard quiesce policy: an empty registry means no one
    /// wants data, so the probe transitions back toward `Disabled`.
    pub auto_disable: bool,

    /// Fallback schedule parameters, merged under each probe type's default
    /// schedule. Only consulted for fields neither the request nor the type
    /// default sets.
    pub fallback: Schedule,
}

impl RuntimeConfig {
    /// Returns the hook grace as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → timeout applied per hook invocation
    #[inline]
    pub fn hook_grace(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for RuntimeConfig {
    /// Default configuration:
    ///
    /// - `grace = 5s` (bounded hook wind-down)
    /// - `bus_capacity = 1024`
    /// - `auto_disable = true` (quiesce on empty registry)
    /// - `fallback` = hourly period, one-minute run duration
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            bus_capacity: 1024,
            auto_disable: true,
            fallback: Schedule::default()
                .with_period(Duration::from_secs(3600))
                .with_duration(Duration::from_secs(60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_grace_means_no_timeout() {
        let mut cfg = RuntimeConfig::default();
        cfg.grace = Duration::ZERO;
        assert!(cfg.hook_grace().is_none());

        cfg.grace = Duration::from_secs(3);
        assert_eq!(cfg.hook_grace(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_bus_capacity_clamped() {
        let mut cfg = RuntimeConfig::default();
        cfg.bus_capacity = 0;
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
