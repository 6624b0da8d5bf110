//! # Subscription gate: defer-until-idle queuing for finite-run probes.
//!
//! Probes whose data stream naturally terminates (a one-shot scan of a
//! finite source) must not hand new subscribers a partial stream. The
//! [`SubscriptionGate`] wraps such a probe's registry: while the probe is
//! `Running` the gate is closed and new subscriptions land in a side queue;
//! on the transition out of `Running` the driver rotates the registry — all
//! live listeners are removed, every queued listener moves in, and the queue
//! is cleared. Every subscriber therefore observes complete runs only,
//! starting with the next one, exactly once.
//!
//! ## Rules
//! - `close` is called by the driver before `on_start`; `rotate` on the
//!   transition out of `Running`. Both take the gate lock, so a subscription
//!   racing the transition lands deterministically on one side.
//! - If a start is aborted (hook failure before `Running`), `reopen` merges
//!   the queue into the live set instead of rotating — nobody was mid-run,
//!   so nobody is evicted.

use std::sync::Mutex;

use crate::listeners::{DataListener, ListenerRef, ListenerRegistry};

/// Gate state: whether subscriptions defer, and the side queue.
struct GateState {
    deferring: bool,
    queued: Vec<ListenerRef>,
}

/// Defers subscriptions while a finite run is in progress.
pub struct SubscriptionGate {
    inner: Mutex<GateState>,
}

impl SubscriptionGate {
    /// Creates an open gate with an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GateState {
                deferring: false,
                queued: Vec::new(),
            }),
        }
    }

    /// Subscribes a listener: straight into the live registry while the gate
    /// is open, into the side queue while it is closed. Idempotent by id on
    /// both sides. Returns `true` if the listener was newly admitted.
    pub fn subscribe(&self, registry: &ListenerRegistry, listener: ListenerRef) -> bool {
        let mut inner = self.inner.lock().expect("subscription gate poisoned");
        if inner.deferring {
            if inner.queued.iter().any(|l| l.id() == listener.id()) {
                return false;
            }
            inner.queued.push(listener);
            true
        } else {
            registry.add(listener)
        }
    }

    /// Drops a queued listener by id (explicit unsubscribe before the next
    /// run). Returns `true` if it was queued.
    pub fn discard(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().expect("subscription gate poisoned");
        let before = inner.queued.len();
        inner.queued.retain(|l| l.id() != id);
        inner.queued.len() != before
    }

    /// True while subscriptions are being deferred.
    pub fn is_deferring(&self) -> bool {
        self.inner.lock().expect("subscription gate poisoned").deferring
    }

    /// Number of queued listeners.
    pub fn queued_len(&self) -> usize {
        self.inner.lock().expect("subscription gate poisoned").queued.len()
    }

    /// Closes the gate: subsequent subscriptions queue. Driver-only, called
    /// before `on_start`.
    pub(crate) fn close(&self) {
        self.inner.lock().expect("subscription gate poisoned").deferring = true;
    }

    /// Rotates the registry on the transition out of `Running`: live
    /// listeners out, queued listeners in, queue cleared, gate open.
    pub(crate) fn rotate(&self, registry: &ListenerRegistry) {
        let mut inner = self.inner.lock().expect("subscription gate poisoned");
        inner.deferring = false;
        let queued = std::mem::take(&mut inner.queued);
        registry.replace_all(queued);
    }

    /// Reopens the gate after an aborted start: queued listeners merge into
    /// the live set, nothing is evicted.
    pub(crate) fn reopen(&self, registry: &ListenerRegistry) {
        let mut inner = self.inner.lock().expect("subscription gate poisoned");
        inner.deferring = false;
        for l in std::mem::take(&mut inner.queued) {
            registry.add(l);
        }
    }
}

impl Default for SubscriptionGate {
    fn default() -> Self {
        Self::new()
    }
}
