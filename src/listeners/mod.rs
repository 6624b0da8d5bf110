//! # Listener membership and delivery.
//!
//! This module groups the consumer-facing delivery surface:
//! - [`DataListener`] — the subscriber trait, explicit id-keyed membership
//! - [`ListenerRegistry`] — per-probe membership set with snapshot fan-out
//! - [`SubscriptionGate`] — defer-until-idle queuing for finite-run probes
//!
//! ## Quick wiring
//! ```text
//! handle.subscribe(listener)
//!    │
//!    ├─ continuous probe ────────────────► ListenerRegistry::add
//!    └─ finite-run probe ─► SubscriptionGate
//!                              ├─ gate open ──► ListenerRegistry::add
//!                              └─ gate closed ► side queue ─┐
//!                                                           │ rotate on
//!                                   ListenerRegistry ◄──────┘ run end
//! ```

mod deferred;
mod listener;
mod registry;

pub use deferred::SubscriptionGate;
pub use listener::{DataListener, ListenerRef};
pub use registry::ListenerRegistry;
