//! Error types used by the probevisor runtime and probe hooks.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`] — errors raised by the orchestration runtime itself
//!   (unknown probe types, bad configurations, persistence failures).
//! - [`ProbeError`] — errors raised by individual probe hook invocations.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for
//! logging/metrics.

use thiserror::Error;

/// # Errors produced by the probevisor runtime.
///
/// These represent failures in the coordination layer itself: resolving a
/// probe identity, building a probe instance, or persisting the request
/// store. They are always reported synchronously to the caller that
/// triggered the operation and are never retried automatically.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No probe type with this name is registered.
    #[error("unknown probe type: {name}")]
    UnknownProbeType {
        /// The requested probe type name.
        name: String,
    },

    /// The probe configuration could not be resolved into an instance.
    #[error("invalid configuration for {probe}: {error}")]
    InvalidConfig {
        /// Probe type name the configuration was aimed at.
        probe: String,
        /// Underlying reason.
        error: String,
    },

    /// A request store write failed; the in-memory view was rolled back.
    #[error("request store persistence failed: {error}")]
    Persistence {
        /// Underlying I/O or serialization message.
        error: String,
    },

    /// The coordinator has shut down and no longer accepts commands.
    #[error("coordinator closed")]
    Closed,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::UnknownProbeType { .. } => "unknown_probe_type",
            RuntimeError::InvalidConfig { .. } => "invalid_config",
            RuntimeError::Persistence { .. } => "persistence_failed",
            RuntimeError::Closed => "coordinator_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Errors produced by probe hook execution.
///
/// These represent failures of individual `on_enable`/`on_start`/`on_stop`/
/// `on_disable` implementations. A hook error is caught on the probe's own
/// driver task and forces that probe to `Disabled`; it never propagates to
/// other probes or to the coordinator.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The hook failed; the probe cannot continue in its current state.
    #[error("probe hook failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The hook observed cancellation and gave up cooperatively.
    #[error("run cancelled")]
    Canceled,
}

impl ProbeError {
    /// Wraps an arbitrary error into [`ProbeError::Failed`].
    pub fn failed(error: impl std::fmt::Display) -> Self {
        ProbeError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProbeError::Failed { .. } => "hook_failed",
            ProbeError::Canceled => "hook_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ProbeError::Failed { error } => format!("error: {error}"),
            ProbeError::Canceled => "run cancelled".to_string(),
        }
    }
}
