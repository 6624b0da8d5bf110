//! # probevisor
//!
//! **Probevisor** is a probe lifecycle and schedule-resolution engine for
//! data-collection pipelines.
//!
//! Independent "probes" (an accelerometer sampler, a location source, a
//! content scan) produce timestamped records that are delivered to
//! registered listeners, under a schedule merged from possibly many
//! overlapping, independent requesters. The crate is designed as a building
//! block: concrete sensor adapters plug in through the [`Probe`] trait, the
//! host's alarm primitive through [`WakeScheduler`], and a wake-lock
//! mechanism through [`ExclusivitySource`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//!  │  Requester A │  │  Requester B │  │  Requester C │
//!  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!         │ submit / withdraw (ScheduleRequest)│
//!         ▼                 ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Coordinator (driver actor)                                       │
//! │  - RequestStore (durable (requester, request_id) → request)       │
//! │  - resolve(): requests → next run, min period, strictness         │
//! │  - one pending wake per probe identity (WakeScheduler)            │
//! │  - identity-keyed probe cache, explicit eviction                  │
//! └──────┬──────────────────────┬──────────────────────┬──────────────┘
//!        ▼                      ▼                      ▼
//! ┌──────────────┐      ┌──────────────┐      ┌──────────────┐
//! │ Probe driver │      │ Probe driver │      │ Probe driver │
//! │ (actor, FIFO │      │  Disabled ⇄  │      │  + Subscrip- │
//! │  directives) │      │  Enabled ⇄   │      │  tionGate    │
//! │              │      │  Running     │      │  (terminal)  │
//! └──────┬───────┘      └──────┬───────┘      └──────┬───────┘
//!        │ on_start spawns sampling under the run token
//!        ▼                      ▼                      ▼
//!   ProbeContext::emit ──► ListenerRegistry ──► DataListener::on_data
//!        │
//!        └── StateChanged / ProbeFailed / Wake* ──► Bus ──► Subscribe
//! ```
//!
//! ### Lifecycle
//! ```text
//! handle.start()            (any thread, non-blocking enqueue)
//!    │
//!    ▼ driver task (private, serialized)
//!  Disabled ──on_enable──► Enabled
//!    │ acquire exclusivity guard, close gate, fresh run token
//!    ├──on_start──► Running ──┐
//!    │                        │ stop: cancel token, on_stop (grace),
//!    │                        │       release guard, rotate gate
//!    ▼                        ▼
//!  hook failure ──► Disabled  Enabled ──on_disable──► Disabled
//! ```
//!
//! ## Features
//! | Area             | Description                                               | Key types / traits                        |
//! |------------------|-----------------------------------------------------------|-------------------------------------------|
//! | **Probes**       | Implement data producers as four async lifecycle hooks.   | [`Probe`], [`ProbeContext`], [`ProbeKind`] |
//! | **Lifecycle**    | Serialized four-state machine per probe instance.         | [`ProbeHandle`], [`LifecycleState`]       |
//! | **Delivery**     | Snapshot fan-out with defer-until-idle queuing.           | [`DataListener`], [`ListenerRegistry`]    |
//! | **Scheduling**   | Merge many requests into one next run per probe.          | [`ScheduleRequest`], [`ResolvedSchedule`] |
//! | **Persistence**  | Durable request store with rollback on write failure.     | [`RequestStore`]                          |
//! | **Coordination** | One pending wake per identity, replace-not-duplicate.     | [`Coordinator`], [`WakeScheduler`]        |
//! | **Observability**| Broadcast runtime events to subscribers.                  | [`Event`], [`Subscribe`]                  |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use probevisor::{
//!     Coordinator, DataRecord, Probe, ProbeContext, ProbeError, ProbeKind,
//!     ProbeRef, ProbeTypeRegistry, Schedule, ScheduleRequest,
//! };
//!
//! struct Heartbeat;
//!
//! #[async_trait]
//! impl Probe for Heartbeat {
//!     fn name(&self) -> &str { "heartbeat" }
//!
//!     async fn on_start(&self, cx: &ProbeContext) -> Result<(), ProbeError> {
//!         cx.emit(DataRecord::new().with("beat", true)).await;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut kinds = ProbeTypeRegistry::new();
//!     kinds.register(
//!         ProbeKind::new("heartbeat", |_cfg| Ok(Arc::new(Heartbeat) as ProbeRef))
//!             .with_defaults(Schedule::default().with_period(Duration::from_secs(60))),
//!     );
//!
//!     let coordinator = Coordinator::builder(kinds).build();
//!     let identity = coordinator.identity("heartbeat", None)?;
//!
//!     // Ask for a beat every 30 seconds; the soonest requester wins.
//!     coordinator.submit(ScheduleRequest::new(
//!         "demo",
//!         "beat-30s",
//!         identity.clone(),
//!         Schedule::default().with_period(Duration::from_secs(30)),
//!     ))?;
//!     Ok(())
//! }
//! ```

mod config;
mod coordinator;
mod error;
mod events;
mod identity;
mod lifecycle;
mod listeners;
mod probes;
mod requests;
mod schedule;
pub mod subscribers;

// ---- Public re-exports ----

pub use config::RuntimeConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder, TimerWakes, WakeFn, WakeScheduler, WakeToken};
pub use error::{ProbeError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use identity::ProbeIdentity;
pub use lifecycle::{
    spawn_probe, ExclusivityGuard, ExclusivitySource, LifecycleState, NoopExclusivity,
    ProbeContext, ProbeHandle,
};
pub use listeners::{DataListener, ListenerRef, ListenerRegistry, SubscriptionGate};
pub use probes::{DataRecord, Delivery, Probe, ProbeFactory, ProbeKind, ProbeRef, ProbeTypeRegistry};
pub use requests::{RequestKey, RequestStore, Schedule, ScheduleRequest};
pub use schedule::{resolve, stop_after, ResolvedSchedule};
pub use subscribers::Subscribe;

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
