//! # Probe abstraction: the adapter-facing hook trait.
//!
//! A [`Probe`] is a named, independently schedulable data producer. The
//! framework owns its lifecycle; the adapter supplies the four hooks, each
//! invoked on the probe's private driver task with a [`ProbeContext`].
//!
//! ## Hook discipline
//! Hooks must return quickly. Long-running sampling work is spawned onto the
//! runtime under the context's run token and wound down cooperatively when
//! the token is cancelled:
//!
//! ```rust
//! use async_trait::async_trait;
//! use probevisor::{DataRecord, Probe, ProbeContext, ProbeError};
//!
//! struct Heartbeat;
//!
//! #[async_trait]
//! impl Probe for Heartbeat {
//!     fn name(&self) -> &str { "heartbeat" }
//!
//!     async fn on_start(&self, cx: &ProbeContext) -> Result<(), ProbeError> {
//!         let cx = cx.clone();
//!         tokio::spawn(async move {
//!             let token = cx.run_token();
//!             while !token.is_cancelled() {
//!                 cx.emit(DataRecord::new().with("beat", true)).await;
//!                 tokio::time::sleep(std::time::Duration::from_millis(250)).await;
//!             }
//!         });
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProbeError;
use crate::lifecycle::ProbeContext;

/// How a probe's run ends.
///
/// Decides whether the probe gets the defer-until-idle subscription gate and
/// whether the coordinator schedules a companion stop wake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Runs until stopped; the coordinator bounds each activation with a
    /// stop wake at `start + max(duration)`.
    Continuous,
    /// The run ends on its own once the finite source is exhausted (the
    /// adapter calls [`ProbeContext::request_stop`]). Subscriptions made
    /// mid-run are deferred to the next run.
    Terminal,
}

/// A named, independently schedulable data producer.
///
/// All hooks default to no-ops except `on_start`; most adapters only need
/// `on_start`/`on_stop`. Errors are caught by the driver, reported on the
/// bus, and force the probe to `Disabled`.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Returns the probe type name (stable, used in identities and logs).
    fn name(&self) -> &str;

    /// Entering `Enabled`: subscribe to opportunistic/passive sources.
    async fn on_enable(&self, cx: &ProbeContext) -> Result<(), ProbeError> {
        let _ = cx;
        Ok(())
    }

    /// Entering `Running`: begin active data production.
    async fn on_start(&self, cx: &ProbeContext) -> Result<(), ProbeError>;

    /// Leaving `Running`: wind down active production. The run token is
    /// already cancelled when this is invoked.
    async fn on_stop(&self, cx: &ProbeContext) -> Result<(), ProbeError> {
        let _ = cx;
        Ok(())
    }

    /// Entering `Disabled`: release passive sources.
    async fn on_disable(&self, cx: &ProbeContext) -> Result<(), ProbeError> {
        let _ = cx;
        Ok(())
    }
}

/// Shared probe handle.
pub type ProbeRef = Arc<dyn Probe>;
