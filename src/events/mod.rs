//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by probe drivers, the
//! delivery fan-out, and the coordinator.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: probe drivers (state changes, hook failures), the
//!   listener registry (delivery panics), the coordinator (wakes, requests).
//! - **Consumers**: the coordinator's run-completion listener, user
//!   subscribers via [`Subscribe`](crate::Subscribe), test recorders.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
