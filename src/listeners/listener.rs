//! # Data listener trait.
//!
//! Provides [`DataListener`], the extension point for consumers of probe
//! output. Listener membership is explicit: a listener is delivered to until
//! `unsubscribe` is called with its id — the registry never silently drops
//! one.
//!
//! ## Rules
//! - `id()` must be stable for the listener's lifetime; `add`/`remove` are
//!   idempotent by id.
//! - `on_data` is awaited during fan-out from the emitting probe's context;
//!   keep it quick and non-blocking, or hand the record off to a channel.
//! - Panics are caught per listener and reported as
//!   `EventKind::ListenerPanicked`; other listeners are unaffected.

use std::sync::Arc;

use async_trait::async_trait;

use crate::probes::DataRecord;

/// Consumer of probe data records.
#[async_trait]
pub trait DataListener: Send + Sync + 'static {
    /// Returns the stable identity of this listener within a registry.
    fn id(&self) -> &str;

    /// Receives one stamped data record.
    ///
    /// Called sequentially per delivery; a slow listener delays the rest of
    /// the fan-out for its probe only.
    async fn on_data(&self, record: &DataRecord);
}

/// Shared listener handle.
pub type ListenerRef = Arc<dyn DataListener>;
