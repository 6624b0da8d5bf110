//! # Event subscriber trait.
//!
//! Provides [`Subscribe`], the extension point for plugging custom event
//! handlers (logging, metrics, alerting) into the runtime.
//!
//! Subscribers attach to the [`Bus`](crate::events::Bus) through
//! [`attach`]: each gets a dedicated worker task draining its own broadcast
//! receiver, with panic isolation — a panicking subscriber only loses its
//! own worker iteration, never another subscriber's.
//!
//! ## Rules
//! - Use async I/O; avoid blocking the executor.
//! - A slow subscriber lags its own receiver only (it observes
//!   `RecvError::Lagged` and skips old events).
//! - Events are processed sequentially (FIFO) per subscriber.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;

use crate::events::{Bus, Event};

/// Event subscriber for runtime observability.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, never in the publisher context.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in logs.
    ///
    /// Prefer short, descriptive names (e.g., "log", "metrics", "audit").
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Attaches a subscriber to the bus: spawns its worker task.
///
/// The worker runs until the bus is dropped. Panics inside `on_event` are
/// caught and logged; the worker keeps processing subsequent events.
pub fn attach(bus: &Bus, subscriber: Arc<dyn Subscribe>) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    let fut = subscriber.on_event(&ev);
                    if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                        tracing::warn!(subscriber = subscriber.name(), "event subscriber panicked");
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(subscriber = subscriber.name(), skipped = n, "event subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
