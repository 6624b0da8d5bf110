//! # Coordination: request intake, wake programming, probe cache.
//!
//! This module contains the orchestration layer over many probes:
//! - [`Coordinator`] / [`CoordinatorBuilder`] — the driver actor owning the
//!   identity-keyed instance cache and the request → wake pipeline
//! - [`WakeScheduler`], [`WakeToken`], [`WakeFn`] — the host alarm boundary
//! - [`TimerWakes`] — in-process tokio-timer implementation
//!
//! ## Quick wiring
//! ```text
//! submit ─► store.put ─► resolve ─► wakes.schedule ─► fire ─► handle.start
//!                                                 run ends ─► re-resolve
//! ```

mod coordinator;
mod waker;

pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use waker::{TimerWakes, WakeFn, WakeScheduler, WakeToken};
