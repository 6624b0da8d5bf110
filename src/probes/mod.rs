//! # Probe abstractions: hooks, records, and the type registry.
//!
//! This module provides the adapter-facing types:
//! - [`Probe`] - trait with the four lifecycle hooks
//! - [`ProbeRef`] - shared reference to a probe (`Arc<dyn Probe>`)
//! - [`Delivery`] - continuous vs. naturally terminating runs
//! - [`DataRecord`] - the delivery envelope for probe output
//! - [`ProbeKind`], [`ProbeTypeRegistry`] - explicit per-type registration
//!   (factory, default schedule, delivery mode)

mod probe;
mod record;
mod registry;

pub use probe::{Delivery, Probe, ProbeRef};
pub use record::DataRecord;
pub use registry::{ProbeFactory, ProbeKind, ProbeTypeRegistry};
