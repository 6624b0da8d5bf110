//! # Event subscribers for the probevisor runtime.
//!
//! This module provides the [`Subscribe`] trait and the worker that fans
//! bus events out to user handlers.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Probe driver ── publish(Event) ──► Bus ──► broadcast receivers
//!                                               │
//!                                          attach() worker (per subscriber)
//!                                               │
//!                                          Subscribe::on_event(&Event)
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use async_trait::async_trait;
//! use probevisor::{Event, EventKind, Subscribe};
//!
//! struct Metrics;
//!
//! #[async_trait]
//! impl Subscribe for Metrics {
//!     async fn on_event(&self, event: &Event) {
//!         if matches!(event.kind, EventKind::ProbeFailed) {
//!             // increment failure counter
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "metrics" }
//! }
//! ```

mod subscriber;

pub use subscriber::{attach, Subscribe};

#[cfg(feature = "logging")]
mod log;
#[cfg(feature = "logging")]
pub use log::LogWriter;
