//! # Runtime events emitted by controllers and the coordinator.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Lifecycle events**: probe state changes and hook failures
//! - **Scheduling events**: wakes programmed, cancelled, and fired
//! - **Request events**: schedule requests accepted and withdrawn
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! probe identity URI, states, reasons, and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::lifecycle::LifecycleState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Lifecycle events ===
    /// A probe completed a lifecycle transition.
    ///
    /// Sets:
    /// - `probe`: identity URI
    /// - `state`: the state entered
    /// - `prev`: the state left
    StateChanged,

    /// A probe hook failed or panicked; the probe was forced to `Disabled`.
    ///
    /// Sets:
    /// - `probe`: identity URI
    /// - `reason`: hook name and failure message
    ProbeFailed,

    /// A probe hook exceeded the configured grace period.
    ///
    /// Sets:
    /// - `probe`: identity URI
    /// - `reason`: hook name
    /// - `delay_ms`: the grace that was exceeded
    GraceExceeded,

    // === Scheduling events ===
    /// A wake was programmed for a probe (replacing any previous one).
    ///
    /// Sets:
    /// - `probe`: identity URI
    /// - `delay_ms`: time until the wake fires
    /// - `exact`: whether the wake demands exact timing
    WakeProgrammed,

    /// A probe's pending wake was cancelled (no satisfiable requests).
    ///
    /// Sets:
    /// - `probe`: identity URI
    WakeCancelled,

    /// A programmed wake fired and the probe was started.
    ///
    /// Sets:
    /// - `probe`: identity URI
    WakeFired,

    // === Request events ===
    /// A schedule request was accepted into the store.
    ///
    /// Sets:
    /// - `probe`: identity URI
    /// - `reason`: `requester/request_id` key
    RequestAccepted,

    /// A schedule request was withdrawn from the store.
    ///
    /// Sets:
    /// - `probe`: identity URI
    /// - `reason`: `requester/request_id` key
    RequestWithdrawn,

    // === Delivery events ===
    /// A data listener panicked during delivery (other listeners unaffected).
    ///
    /// Sets:
    /// - `probe`: identity URI
    /// - `reason`: listener id and panic info
    ListenerPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Probe identity URI, if applicable.
    pub probe: Option<Arc<str>>,
    /// State entered (for `StateChanged`).
    pub state: Option<LifecycleState>,
    /// State left (for `StateChanged`).
    pub prev: Option<LifecycleState>,
    /// Human-readable reason (errors, request keys, etc.).
    pub reason: Option<Arc<str>>,
    /// Delay or grace in milliseconds (compact).
    pub delay_ms: Option<u64>,
    /// Whether a programmed wake demands exact timing.
    pub exact: Option<bool>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next global sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            probe: None,
            state: None,
            prev: None,
            reason: None,
            delay_ms: None,
            exact: None,
        }
    }

    /// Attaches a probe identity URI.
    #[inline]
    pub fn with_probe(mut self, probe: impl Into<Arc<str>>) -> Self {
        self.probe = Some(probe.into());
        self
    }

    /// Attaches the state entered.
    #[inline]
    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches the state left.
    #[inline]
    pub fn with_prev(mut self, prev: LifecycleState) -> Self {
        self.prev = Some(prev);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches the exact-timing flag of a programmed wake.
    #[inline]
    pub fn with_exact(mut self, exact: bool) -> Self {
        self.exact = Some(exact);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::now(EventKind::StateChanged);
        let b = Event::now(EventKind::StateChanged);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_builder_fields() {
        let ev = Event::now(EventKind::StateChanged)
            .with_probe("probe://location")
            .with_state(LifecycleState::Running)
            .with_prev(LifecycleState::Enabled);

        assert_eq!(ev.probe.as_deref(), Some("probe://location"));
        assert_eq!(ev.state, Some(LifecycleState::Running));
        assert_eq!(ev.prev, Some(LifecycleState::Enabled));
        assert!(ev.reason.is_none());
    }

    #[test]
    fn test_delay_is_stored_in_millis() {
        let ev = Event::now(EventKind::WakeProgrammed).with_delay(Duration::from_secs(2));
        assert_eq!(ev.delay_ms, Some(2000));
    }
}
