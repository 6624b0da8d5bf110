//! # Listener registry: membership and fan-out delivery.
//!
//! [`ListenerRegistry`] holds the set of consumers subscribed to one probe's
//! output. Membership is the only persisted fact; insertion order is
//! irrelevant.
//!
//! ## Architecture
//! ```text
//! deliver(record)
//!     │  stamp identity + timestamp
//!     │  snapshot subscriber set (read lock, then released)
//!     ├──► listener1.on_data()  ──panic──► ListenerPanicked event
//!     ├──► listener2.on_data()
//!     └──► listenerN.on_data()
//! ```
//!
//! ## Rules
//! - `add`/`remove` are idempotent by listener id.
//! - Delivery fans out to a **snapshot**: mutations during fan-out do not
//!   affect the in-flight delivery.
//! - A panicking listener is isolated via `catch_unwind`; the rest of the
//!   snapshot is still served.
//! - The registry is shared between the probe's driver and arbitrary caller
//!   threads, so it carries its own lock, independent of the driver's
//!   serialization.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::RwLock;
use std::time::SystemTime;

use futures::FutureExt;

use crate::events::{Bus, Event, EventKind};
use crate::listeners::{DataListener, ListenerRef};
use crate::probes::DataRecord;

/// Membership set of one probe's data consumers, with fan-out delivery.
pub struct ListenerRegistry {
    /// Identity URI of the owning probe, stamped onto every record.
    probe: String,
    bus: Bus,
    inner: RwLock<HashMap<String, ListenerRef>>,
}

impl ListenerRegistry {
    /// Creates an empty registry for the given probe identity URI.
    pub fn new(probe: impl Into<String>, bus: Bus) -> Self {
        Self {
            probe: probe.into(),
            bus,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a listener. Returns `false` if one with the same id is already
    /// registered (the existing registration wins).
    pub fn add(&self, listener: ListenerRef) -> bool {
        let mut inner = self.inner.write().expect("listener registry poisoned");
        let id = listener.id().to_string();
        if inner.contains_key(&id) {
            return false;
        }
        inner.insert(id, listener);
        true
    }

    /// Removes a listener by id. Returns `true` if it was present.
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.write().expect("listener registry poisoned");
        inner.remove(id).is_some()
    }

    /// Replaces the whole membership set (used by the subscription gate when
    /// a run finishes: live listeners out, queued listeners in).
    pub(crate) fn replace_all(&self, listeners: Vec<ListenerRef>) {
        let mut inner = self.inner.write().expect("listener registry poisoned");
        inner.clear();
        for l in listeners {
            inner.entry(l.id().to_string()).or_insert(l);
        }
    }

    /// True when no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("listener registry poisoned").is_empty()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.inner.read().expect("listener registry poisoned").len()
    }

    /// Returns a snapshot of the current membership.
    pub fn snapshot(&self) -> Vec<ListenerRef> {
        self.inner
            .read()
            .expect("listener registry poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Stamps and fans out one record to a snapshot of the current set.
    ///
    /// The record keeps its own timestamp when it has one; otherwise the
    /// current wall clock is stamped. Listener panics are caught and
    /// published as [`EventKind::ListenerPanicked`]; delivery continues with
    /// the remaining listeners.
    pub async fn deliver(&self, mut record: DataRecord) {
        record.probe = Some(self.probe.clone());
        if record.timestamp.is_none() {
            record.timestamp = Some(SystemTime::now());
        }

        for listener in self.snapshot() {
            let fut = listener.on_data(&record);
            if let Err(panic_err) = AssertUnwindSafe(fut).catch_unwind().await {
                let info = panic_info(&*panic_err);
                self.bus.publish(
                    Event::now(EventKind::ListenerPanicked)
                        .with_probe(self.probe.clone())
                        .with_reason(format!("listener={} panic={info}", listener.id())),
                );
            }
        }
    }
}

fn panic_info(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct Recorder {
        id: String,
        seen: Arc<Mutex<Vec<DataRecord>>>,
    }

    impl Recorder {
        fn new(id: &str) -> (Arc<Self>, Arc<Mutex<Vec<DataRecord>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            (
                Arc::new(Self {
                    id: id.to_string(),
                    seen: seen.clone(),
                }),
                seen,
            )
        }
    }

    #[async_trait]
    impl DataListener for Recorder {
        fn id(&self) -> &str {
            &self.id
        }

        async fn on_data(&self, record: &DataRecord) {
            self.seen.lock().unwrap().push(record.clone());
        }
    }

    struct Panicker;

    #[async_trait]
    impl DataListener for Panicker {
        fn id(&self) -> &str {
            "panicker"
        }

        async fn on_data(&self, _record: &DataRecord) {
            panic!("listener boom");
        }
    }

    fn registry() -> ListenerRegistry {
        ListenerRegistry::new("probe://test", Bus::new(64))
    }

    #[test]
    fn test_add_is_idempotent_by_id() {
        let reg = registry();
        let (a, _) = Recorder::new("a");
        let (a_again, _) = Recorder::new("a");

        assert!(reg.add(a));
        assert!(!reg.add(a_again));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let reg = registry();
        let (a, _) = Recorder::new("a");
        reg.add(a);

        assert!(reg.remove("a"));
        assert!(!reg.remove("a"));
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn test_delivery_stamps_identity_and_timestamp() {
        let reg = registry();
        let (a, seen) = Recorder::new("a");
        reg.add(a);

        reg.deliver(DataRecord::new().with("x", 1)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].probe.as_deref(), Some("probe://test"));
        assert!(seen[0].timestamp.is_some());
    }

    #[tokio::test]
    async fn test_record_timestamp_is_preserved() {
        let reg = registry();
        let (a, seen) = Recorder::new("a");
        reg.add(a);

        let at = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(12345);
        reg.deliver(DataRecord::new().with_timestamp(at)).await;

        assert_eq!(seen.lock().unwrap()[0].timestamp, Some(at));
    }

    #[tokio::test]
    async fn test_panicking_listener_is_isolated() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let reg = ListenerRegistry::new("probe://test", bus);

        reg.add(Arc::new(Panicker));
        let (ok, seen) = Recorder::new("survivor");
        reg.add(ok);

        reg.deliver(DataRecord::new()).await;

        // The surviving listener still got the record.
        assert_eq!(seen.lock().unwrap().len(), 1);

        // And the panic was reported.
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ListenerPanicked);
        assert!(ev.reason.as_deref().unwrap().contains("panicker"));
    }

    #[tokio::test]
    async fn test_mutation_during_fanout_does_not_affect_snapshot() {
        // A listener that removes itself mid-delivery: the snapshot already
        // taken must still serve every member.
        struct SelfRemover {
            reg: Arc<ListenerRegistry>,
            count: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl DataListener for SelfRemover {
            fn id(&self) -> &str {
                "self-remover"
            }

            async fn on_data(&self, _record: &DataRecord) {
                self.reg.remove("self-remover");
                self.count.fetch_add(1, Ordering::SeqCst);
            }
        }

        let reg = Arc::new(registry());
        let count = Arc::new(AtomicUsize::new(0));
        reg.add(Arc::new(SelfRemover {
            reg: reg.clone(),
            count: count.clone(),
        }));
        let (other, seen) = Recorder::new("other");
        reg.add(other);

        reg.deliver(DataRecord::new()).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(reg.len(), 1);
    }
}
