//! # Probe coordinator: request intake, resolution, and wake programming.
//!
//! The [`Coordinator`] orchestrates many probes. It owns the identity-keyed
//! instance cache (one controller per [`ProbeIdentity`], created lazily on
//! first use, evicted explicitly when both the request set and the listener
//! registry are empty) and reacts to:
//! - request mutations (`submit`/`withdraw`/`withdraw_requester`),
//! - external probe triggers (`enable`/`start`/`stop`/`disable`),
//! - wake firings from the [`WakeScheduler`],
//! - run completions observed on the event bus.
//!
//! On every request mutation it re-runs the schedule resolver and programs
//! **exactly one** pending wake per probe identity, always replacing the
//! previous token. When a wake fires it records the run start, starts the
//! controller and, for continuous probes, programs the companion stop wake
//! at `start + max(duration)`.
//!
//! ## Architecture
//! ```text
//! submit/withdraw ──► RequestStore (persisted, synchronous errors)
//!        │                 │
//!        └── Reschedule ──► driver ── resolve() ──► WakeScheduler
//!                             ▲                        │ fire
//!                             │  RunCompleted          ▼
//!                        bus listener ◄── Bus ◄── ProbeHandle.start()
//! ```
//!
//! Failure isolation: a probe whose factory or hooks fail is logged and
//! skipped; other probes' entries, wakes, and resolution are untouched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::config::RuntimeConfig;
use crate::coordinator::waker::{TimerWakes, WakeScheduler, WakeToken};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::identity::ProbeIdentity;
use crate::lifecycle::{spawn_probe, ExclusivitySource, LifecycleState, NoopExclusivity, ProbeHandle};
use crate::probes::{Delivery, ProbeTypeRegistry};
use crate::requests::{RequestKey, RequestStore, Schedule, ScheduleRequest};
use crate::schedule::{resolve, stop_after};

/// External probe trigger, applied to the identity's controller.
#[derive(Clone, Copy, Debug)]
enum ProbeOp {
    Enable,
    Start,
    Stop,
    Disable,
}

/// Coordinator driver commands.
enum Command {
    Reschedule(ProbeIdentity),
    WakeFired(ProbeIdentity),
    StopFired(ProbeIdentity),
    RunCompleted(Arc<str>),
    Op(ProbeIdentity, ProbeOp),
    Handle {
        identity: ProbeIdentity,
        reply: oneshot::Sender<Result<ProbeHandle, RuntimeError>>,
    },
    Shutdown,
}

/// Orchestrates probes: request intake, schedule resolution, and wakes.
pub struct Coordinator {
    tx: mpsc::UnboundedSender<Command>,
    kinds: Arc<ProbeTypeRegistry>,
    store: Arc<RequestStore>,
    bus: Bus,
}

impl Coordinator {
    /// Starts building a coordinator over the given probe type registry.
    pub fn builder(kinds: ProbeTypeRegistry) -> CoordinatorBuilder {
        CoordinatorBuilder {
            kinds,
            cfg: RuntimeConfig::default(),
            store: None,
            wakes: None,
            exclusivity: None,
        }
    }

    /// Returns the event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Returns the request store.
    pub fn store(&self) -> &Arc<RequestStore> {
        &self.store
    }

    /// Builds the identity for a registered probe type under the given
    /// configuration.
    pub fn identity(
        &self,
        name: &str,
        config: Option<&Value>,
    ) -> Result<ProbeIdentity, RuntimeError> {
        self.kinds.identity(name, config)
    }

    /// Accepts a schedule request: validates the probe type and its
    /// configuration, persists the request (last-write-wins per key), and
    /// triggers re-resolution.
    ///
    /// Configuration and persistence errors are reported synchronously and
    /// never retried; on a persistence error the in-memory store is already
    /// rolled back.
    pub fn submit(&self, request: ScheduleRequest) -> Result<(), RuntimeError> {
        let kind = self.kinds.require(request.probe.name())?;
        // The factory is the configuration check; factories are expected to
        // be cheap, side-effect-free constructors.
        kind.build(request.probe.config().as_ref())?;

        let identity = request.probe.clone();
        let key = request.key();
        self.store.put(request)?;
        self.bus.publish(
            Event::now(EventKind::RequestAccepted)
                .with_probe(identity.uri())
                .with_reason(key.to_string()),
        );
        self.send(Command::Reschedule(identity))
    }

    /// Withdraws one request by key. Unknown keys are a no-op.
    pub fn withdraw(&self, key: &RequestKey) -> Result<(), RuntimeError> {
        let Some(removed) = self.store.remove(key)? else {
            return Ok(());
        };
        self.bus.publish(
            Event::now(EventKind::RequestWithdrawn)
                .with_probe(removed.probe.uri())
                .with_reason(key.to_string()),
        );
        self.send(Command::Reschedule(removed.probe))
    }

    /// Withdraws every request held by one requester and re-resolves each
    /// affected probe.
    pub fn withdraw_requester(&self, requester: &str) -> Result<(), RuntimeError> {
        let removed = self.store.remove_requester(requester)?;
        let mut seen: Vec<ProbeIdentity> = Vec::new();
        for req in removed {
            self.bus.publish(
                Event::now(EventKind::RequestWithdrawn)
                    .with_probe(req.probe.uri())
                    .with_reason(req.key().to_string()),
            );
            if !seen.contains(&req.probe) {
                seen.push(req.probe);
            }
        }
        for identity in seen {
            self.send(Command::Reschedule(identity))?;
        }
        Ok(())
    }

    /// Returns the handle for a probe identity, creating the instance
    /// (lazily) when absent.
    pub async fn probe(&self, identity: &ProbeIdentity) -> Result<ProbeHandle, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Handle {
            identity: identity.clone(),
            reply,
        })?;
        rx.await.map_err(|_| RuntimeError::Closed)?
    }

    /// Enqueues an enable for the identity's controller.
    pub fn enable(&self, identity: &ProbeIdentity) -> Result<(), RuntimeError> {
        self.send(Command::Op(identity.clone(), ProbeOp::Enable))
    }

    /// Enqueues a start for the identity's controller.
    pub fn start(&self, identity: &ProbeIdentity) -> Result<(), RuntimeError> {
        self.send(Command::Op(identity.clone(), ProbeOp::Start))
    }

    /// Enqueues a stop for the identity's controller.
    pub fn stop(&self, identity: &ProbeIdentity) -> Result<(), RuntimeError> {
        self.send(Command::Op(identity.clone(), ProbeOp::Stop))
    }

    /// Enqueues a disable for the identity's controller.
    pub fn disable(&self, identity: &ProbeIdentity) -> Result<(), RuntimeError> {
        self.send(Command::Op(identity.clone(), ProbeOp::Disable))
    }

    /// Cancels every pending wake and disables every cached probe.
    pub fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> Result<(), RuntimeError> {
        self.tx.send(command).map_err(|_| RuntimeError::Closed)
    }
}

/// Builder for a [`Coordinator`] with optional collaborators.
pub struct CoordinatorBuilder {
    kinds: ProbeTypeRegistry,
    cfg: RuntimeConfig,
    store: Option<Arc<RequestStore>>,
    wakes: Option<Arc<dyn WakeScheduler>>,
    exclusivity: Option<Arc<dyn ExclusivitySource>>,
}

impl CoordinatorBuilder {
    /// Sets the runtime configuration.
    pub fn with_config(mut self, cfg: RuntimeConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the request store (defaults to an in-memory store).
    pub fn with_store(mut self, store: Arc<RequestStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the wake scheduler (defaults to in-process [`TimerWakes`]).
    pub fn with_wakes(mut self, wakes: Arc<dyn WakeScheduler>) -> Self {
        self.wakes = Some(wakes);
        self
    }

    /// Sets the exclusivity source (defaults to [`NoopExclusivity`]).
    pub fn with_exclusivity(mut self, exclusivity: Arc<dyn ExclusivitySource>) -> Self {
        self.exclusivity = Some(exclusivity);
        self
    }

    /// Builds the coordinator and spawns its driver and bus listener.
    ///
    /// Wakes for requests already present in the store (a reopened durable
    /// store) are programmed immediately.
    pub fn build(self) -> Coordinator {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let kinds = Arc::new(self.kinds);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(RequestStore::in_memory()));
        let wakes = self.wakes.unwrap_or_else(|| Arc::new(TimerWakes::new()));
        let exclusivity = self
            .exclusivity
            .unwrap_or_else(|| Arc::new(NoopExclusivity));

        let (tx, rx) = mpsc::unbounded_channel();

        // Run-completion listener: any transition out of Running means the
        // probe's schedule must be re-resolved.
        let mut bus_rx = bus.subscribe();
        let completion_tx = tx.downgrade();
        tokio::spawn(async move {
            loop {
                match bus_rx.recv().await {
                    Ok(ev) => {
                        if ev.kind == EventKind::StateChanged
                            && ev.prev == Some(LifecycleState::Running)
                        {
                            if let Some(probe) = ev.probe {
                                let Some(tx) = completion_tx.upgrade() else {
                                    break;
                                };
                                let _ = tx.send(Command::RunCompleted(probe));
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "coordinator bus listener lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let driver = CoordinatorDriver {
            kinds: Arc::clone(&kinds),
            store: Arc::clone(&store),
            cfg: self.cfg,
            bus: bus.clone(),
            wakes,
            exclusivity,
            entries: HashMap::new(),
            self_tx: tx.downgrade(),
            rx,
        };
        tokio::spawn(driver.run());

        Coordinator {
            tx,
            kinds,
            store,
            bus,
        }
    }
}

/// Cached per-identity probe entry.
struct Entry {
    handle: ProbeHandle,
    defaults: Schedule,
    delivery: Delivery,
    wake: Option<WakeToken>,
    stop_wake: Option<WakeToken>,
}

/// The coordinator's driver task.
struct CoordinatorDriver {
    kinds: Arc<ProbeTypeRegistry>,
    store: Arc<RequestStore>,
    cfg: RuntimeConfig,
    bus: Bus,
    wakes: Arc<dyn WakeScheduler>,
    exclusivity: Arc<dyn ExclusivitySource>,
    entries: HashMap<ProbeIdentity, Entry>,
    self_tx: mpsc::WeakUnboundedSender<Command>,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl CoordinatorDriver {
    async fn run(mut self) {
        // Restart recovery: requests that survived in the durable store get
        // their wakes reprogrammed before any new command is processed.
        for identity in self.store.identities() {
            self.reschedule(&identity);
        }

        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Reschedule(identity) => self.reschedule(&identity),
                Command::WakeFired(identity) => self.wake_fired(&identity),
                Command::StopFired(identity) => {
                    if let Some(entry) = self.entries.get_mut(&identity) {
                        entry.stop_wake = None;
                        entry.handle.stop();
                    }
                }
                Command::RunCompleted(uri) => {
                    let identity = self
                        .entries
                        .keys()
                        .find(|id| id.uri() == uri.as_ref())
                        .cloned();
                    if let Some(identity) = identity {
                        self.reschedule(&identity);
                    }
                }
                Command::Op(identity, op) => self.apply_op(&identity, op),
                Command::Handle { identity, reply } => {
                    let result = self
                        .ensure_entry(&identity)
                        .map(|entry| entry.handle.clone());
                    let _ = reply.send(result);
                }
                Command::Shutdown => {
                    self.teardown();
                    break;
                }
            }
        }
    }

    /// Re-resolves one probe's schedule and reprograms its wake.
    fn reschedule(&mut self, identity: &ProbeIdentity) {
        let requests = self.store.requests_for(identity);
        if requests.is_empty() {
            self.cancel_wakes(identity, true);
            self.evict_if_idle(identity);
            return;
        }

        let defaults = match self.ensure_entry(identity) {
            Ok(entry) => entry.defaults.clone(),
            Err(e) => {
                // This probe cannot be built; others' scheduling continues.
                tracing::warn!(probe = %identity, error = %e, "probe unavailable; skipping resolution");
                return;
            }
        };

        // Exactly one pending wake per identity: the previous token is
        // dropped before a new one is programmed.
        let had_wake = {
            let entry = self.entries.get_mut(identity).expect("entry just ensured");
            entry.wake.take()
        };
        if let Some(prev) = &had_wake {
            self.wakes.cancel(prev);
        }

        let last_run = self.store.last_run(identity);
        let now = SystemTime::now();
        match resolve(&requests, &defaults, last_run, now) {
            Some(resolved) => {
                let fire = self.wake_fn(identity.clone());
                let token =
                    self.wakes
                        .schedule(resolved.next_run, resolved.period, resolved.exact, fire);
                let entry = self.entries.get_mut(identity).expect("entry just ensured");
                entry.wake = Some(token);
                self.bus.publish(
                    Event::now(EventKind::WakeProgrammed)
                        .with_probe(identity.uri())
                        .with_delay(
                            resolved
                                .next_run
                                .duration_since(now)
                                .unwrap_or_default(),
                        )
                        .with_exact(resolved.exact),
                );
            }
            None => {
                if had_wake.is_some() {
                    self.bus
                        .publish(Event::now(EventKind::WakeCancelled).with_probe(identity.uri()));
                }
            }
        }
    }

    /// A programmed wake fired: record the run start, start the probe, and
    /// for continuous probes program the companion stop wake.
    fn wake_fired(&mut self, identity: &ProbeIdentity) {
        let requests = self.store.requests_for(identity);
        if requests.is_empty() {
            // Withdrawn between programming and firing.
            return;
        }

        let now = SystemTime::now();
        if let Err(e) = self.store.record_run(identity, now) {
            tracing::warn!(probe = %identity, error = %e, "failed to record run start");
        }

        let Some(entry) = self.entries.get_mut(identity) else {
            return;
        };
        entry.handle.start();
        self.bus
            .publish(Event::now(EventKind::WakeFired).with_probe(identity.uri()));

        if entry.delivery == Delivery::Continuous {
            if let Some(duration) = stop_after(&requests, &entry.defaults) {
                let fire = {
                    let identity = identity.clone();
                    let tx = self.self_tx.clone();
                    Arc::new(move || {
                        if let Some(tx) = tx.upgrade() {
                            let _ = tx.send(Command::StopFired(identity.clone()));
                        }
                    })
                };
                let token = self.wakes.schedule(now + duration, None, false, fire);
                if let Some(prev) = entry.stop_wake.replace(token) {
                    self.wakes.cancel(&prev);
                }
            }
        }
    }

    fn apply_op(&mut self, identity: &ProbeIdentity, op: ProbeOp) {
        match op {
            // Enable/start create the instance lazily.
            ProbeOp::Enable | ProbeOp::Start => match self.ensure_entry(identity) {
                Ok(entry) => match op {
                    ProbeOp::Enable => entry.handle.enable(),
                    _ => entry.handle.start(),
                },
                Err(e) => {
                    tracing::warn!(probe = %identity, error = %e, "probe unavailable");
                }
            },
            // Stop/disable only touch an existing instance.
            ProbeOp::Stop => {
                if let Some(entry) = self.entries.get(identity) {
                    entry.handle.stop();
                }
            }
            ProbeOp::Disable => {
                if let Some(entry) = self.entries.get(identity) {
                    entry.handle.disable();
                }
            }
        }
    }

    /// Looks up or lazily creates the controller for an identity.
    fn ensure_entry(&mut self, identity: &ProbeIdentity) -> Result<&mut Entry, RuntimeError> {
        if !self.entries.contains_key(identity) {
            let kind = self.kinds.require(identity.name())?;
            let probe = kind.build(identity.config().as_ref())?;
            let defaults = kind.defaults().merged(&self.cfg.fallback);
            let delivery = kind.delivery();
            let handle = spawn_probe(
                probe,
                identity.clone(),
                delivery,
                self.bus.clone(),
                Arc::clone(&self.exclusivity),
                &self.cfg,
            );
            self.entries.insert(
                identity.clone(),
                Entry {
                    handle,
                    defaults,
                    delivery,
                    wake: None,
                    stop_wake: None,
                },
            );
        }
        Ok(self.entries.get_mut(identity).expect("entry just inserted"))
    }

    /// Cancels both wakes of one identity, optionally announcing it.
    fn cancel_wakes(&mut self, identity: &ProbeIdentity, announce: bool) {
        let Some(entry) = self.entries.get_mut(identity) else {
            return;
        };
        let mut cancelled = false;
        if let Some(token) = entry.wake.take() {
            self.wakes.cancel(&token);
            cancelled = true;
        }
        if let Some(token) = entry.stop_wake.take() {
            self.wakes.cancel(&token);
            cancelled = true;
        }
        if announce && cancelled {
            self.bus
                .publish(Event::now(EventKind::WakeCancelled).with_probe(identity.uri()));
        }
    }

    /// Explicit eviction: no requests, no listeners, controller disabled.
    fn evict_if_idle(&mut self, identity: &ProbeIdentity) {
        let idle = self.entries.get(identity).is_some_and(|entry| {
            !entry.handle.has_listeners()
                && entry.handle.state() == LifecycleState::Disabled
        });
        if idle {
            self.entries.remove(identity);
        }
    }

    fn wake_fn(&self, identity: ProbeIdentity) -> crate::coordinator::waker::WakeFn {
        let tx = self.self_tx.clone();
        Arc::new(move || {
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::WakeFired(identity.clone()));
            }
        })
    }

    fn teardown(&mut self) {
        let identities: Vec<ProbeIdentity> = self.entries.keys().cloned().collect();
        for identity in identities {
            self.cancel_wakes(&identity, false);
        }
        for entry in self.entries.values() {
            entry.handle.disable();
        }
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::lifecycle::ProbeContext;
    use crate::listeners::DataListener;
    use crate::probes::{DataRecord, Probe, ProbeKind, ProbeRef};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Continuous probe that emits one record per activation.
    struct Pulse;

    #[async_trait]
    impl Probe for Pulse {
        fn name(&self) -> &str {
            "pulse"
        }

        async fn on_start(&self, cx: &ProbeContext) -> Result<(), ProbeError> {
            cx.emit(DataRecord::new().with("pulse", 1)).await;
            Ok(())
        }
    }

    /// Terminal probe: scans three rows, then requests its own stop.
    struct Scan;

    #[async_trait]
    impl Probe for Scan {
        fn name(&self) -> &str {
            "scan"
        }

        async fn on_start(&self, cx: &ProbeContext) -> Result<(), ProbeError> {
            let cx = cx.clone();
            tokio::spawn(async move {
                for row in 0..3 {
                    cx.emit(DataRecord::new().with("row", row)).await;
                }
                cx.request_stop();
            });
            Ok(())
        }
    }

    fn pulse_kinds(defaults: Schedule) -> ProbeTypeRegistry {
        let mut kinds = ProbeTypeRegistry::new();
        kinds.register(
            ProbeKind::new("pulse", |_cfg| Ok(Arc::new(Pulse) as ProbeRef))
                .with_defaults(defaults),
        );
        kinds
    }

    /// Wake scheduler that records programming without ever firing.
    #[derive(Default)]
    struct RecordingWakes {
        next: AtomicU64,
        pending: Mutex<Vec<u64>>,
    }

    impl RecordingWakes {
        fn pending_count(&self) -> usize {
            self.pending.lock().unwrap().len()
        }
    }

    impl WakeScheduler for RecordingWakes {
        fn schedule(
            &self,
            _at: SystemTime,
            _repeat: Option<Duration>,
            _exact: bool,
            _fire: crate::coordinator::waker::WakeFn,
        ) -> WakeToken {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            self.pending.lock().unwrap().push(id);
            WakeToken::new(id)
        }

        fn cancel(&self, token: &WakeToken) {
            self.pending.lock().unwrap().retain(|id| *id != token.value());
        }
    }

    async fn wait_for_state(handle: &ProbeHandle, want: LifecycleState) {
        let mut watch = handle.watch_state();
        tokio::time::timeout(Duration::from_secs(5), async {
            while *watch.borrow_and_update() != want {
                watch.changed().await.unwrap();
            }
        })
        .await
        .unwrap_or_else(|_| panic!("probe never reached {want}"));
    }

    #[tokio::test]
    async fn test_submit_unknown_type_fails_synchronously() {
        let coordinator = Coordinator::builder(ProbeTypeRegistry::new()).build();
        let request = ScheduleRequest::new(
            "a",
            "r1",
            ProbeIdentity::new("nope"),
            Schedule::default(),
        );
        assert!(matches!(
            coordinator.submit(request),
            Err(RuntimeError::UnknownProbeType { .. })
        ));
        assert!(coordinator.store().is_empty());
    }

    #[tokio::test]
    async fn test_submitted_request_starts_probe() {
        let coordinator = Coordinator::builder(pulse_kinds(Schedule::default())).build();
        let identity = coordinator.identity("pulse", None).unwrap();
        let handle = coordinator.probe(&identity).await.unwrap();

        coordinator
            .submit(ScheduleRequest::new(
                "a",
                "r1",
                identity.clone(),
                Schedule::default().once(),
            ))
            .unwrap();

        wait_for_state(&handle, LifecycleState::Running).await;
        assert!(coordinator.store().last_run(&identity).is_some());
    }

    /// Waits until the bus carries a `StateChanged` into `want`, optionally
    /// from a specific previous state. Bus events are queued, so fast
    /// transition chains are never missed.
    async fn wait_for_transition(
        rx: &mut tokio::sync::broadcast::Receiver<Event>,
        want: LifecycleState,
        from: Option<LifecycleState>,
    ) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(ev)
                        if ev.kind == EventKind::StateChanged
                            && ev.state == Some(want)
                            && (from.is_none() || ev.prev == from) =>
                    {
                        break;
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        panic!("bus closed")
                    }
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("transition to {want} never observed"));
    }

    #[tokio::test]
    async fn test_continuous_run_is_stopped_after_duration() {
        let kinds = pulse_kinds(Schedule::default().with_duration(Duration::from_millis(100)));
        let mut cfg = RuntimeConfig::default();
        cfg.auto_disable = false;
        let coordinator = Coordinator::builder(kinds).with_config(cfg).build();
        let identity = coordinator.identity("pulse", None).unwrap();
        coordinator.probe(&identity).await.unwrap();
        let mut rx = coordinator.bus().subscribe();

        coordinator
            .submit(ScheduleRequest::new(
                "a",
                "r1",
                identity.clone(),
                Schedule::default().once(),
            ))
            .unwrap();

        wait_for_transition(&mut rx, LifecycleState::Running, None).await;
        // The companion stop wake winds the run down after max(duration).
        wait_for_transition(
            &mut rx,
            LifecycleState::Enabled,
            Some(LifecycleState::Running),
        )
        .await;
    }

    #[tokio::test]
    async fn test_exactly_one_pending_wake_per_identity() {
        let wakes = Arc::new(RecordingWakes::default());
        let coordinator = Coordinator::builder(pulse_kinds(Schedule::default()))
            .with_wakes(wakes.clone())
            .build();
        let identity = coordinator.identity("pulse", None).unwrap();

        coordinator
            .submit(ScheduleRequest::new(
                "a",
                "r1",
                identity.clone(),
                Schedule::default().with_period(Duration::from_secs(60)),
            ))
            .unwrap();
        // probe() round-trips through the driver: everything submitted
        // before it has been processed once it returns.
        coordinator.probe(&identity).await.unwrap();
        assert_eq!(wakes.pending_count(), 1);

        // Re-submitting the same key replaces the wake, never duplicates it.
        coordinator
            .submit(ScheduleRequest::new(
                "a",
                "r1",
                identity.clone(),
                Schedule::default().with_period(Duration::from_secs(30)),
            ))
            .unwrap();
        coordinator.probe(&identity).await.unwrap();
        assert_eq!(wakes.pending_count(), 1);

        // Withdrawing the last request cancels the wake.
        coordinator.withdraw(&RequestKey::new("a", "r1")).unwrap();
        coordinator.probe(&identity).await.unwrap();
        assert_eq!(wakes.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reopened_store_reprograms_wakes() {
        let store = Arc::new(RequestStore::in_memory());
        let identity = ProbeIdentity::new("pulse");
        store
            .put(ScheduleRequest::new(
                "a",
                "r1",
                identity.clone(),
                Schedule::default().with_period(Duration::from_secs(60)),
            ))
            .unwrap();

        let wakes = Arc::new(RecordingWakes::default());
        let coordinator = Coordinator::builder(pulse_kinds(Schedule::default()))
            .with_store(store)
            .with_wakes(wakes.clone())
            .build();

        // Barrier through the driver; startup recovery runs first.
        coordinator.probe(&identity).await.unwrap();
        assert_eq!(wakes.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_terminal_probe_serves_one_complete_run() {
        struct Collect {
            rows: Arc<Mutex<Vec<DataRecord>>>,
        }

        #[async_trait]
        impl DataListener for Collect {
            fn id(&self) -> &str {
                "collect"
            }

            async fn on_data(&self, record: &DataRecord) {
                self.rows.lock().unwrap().push(record.clone());
            }
        }

        let mut kinds = ProbeTypeRegistry::new();
        kinds.register(
            ProbeKind::new("scan", |_cfg| Ok(Arc::new(Scan) as ProbeRef))
                .with_delivery(Delivery::Terminal),
        );
        let coordinator = Coordinator::builder(kinds).build();
        let identity = coordinator.identity("scan", None).unwrap();
        let handle = coordinator.probe(&identity).await.unwrap();

        let rows = Arc::new(Mutex::new(Vec::new()));
        handle.subscribe(Arc::new(Collect { rows: rows.clone() }));
        let mut rx = coordinator.bus().subscribe();

        coordinator
            .submit(ScheduleRequest::new(
                "a",
                "r1",
                identity.clone(),
                Schedule::default().once(),
            ))
            .unwrap();

        // The scan requests its own stop; with the run's subscribers rotated
        // out and nobody queued, the quiesce policy disables the probe.
        wait_for_transition(&mut rx, LifecycleState::Disabled, None).await;

        let rows = rows.lock().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.probe.as_deref() == Some("probe://scan")));
    }

    #[tokio::test]
    async fn test_withdraw_requester_sweeps_probes() {
        let wakes = Arc::new(RecordingWakes::default());
        let coordinator = Coordinator::builder(pulse_kinds(Schedule::default()))
            .with_wakes(wakes.clone())
            .build();
        let identity = coordinator.identity("pulse", None).unwrap();

        for id in ["r1", "r2"] {
            coordinator
                .submit(ScheduleRequest::new(
                    "a",
                    id,
                    identity.clone(),
                    Schedule::default().with_period(Duration::from_secs(60)),
                ))
                .unwrap();
        }
        coordinator.probe(&identity).await.unwrap();
        assert_eq!(wakes.pending_count(), 1);

        coordinator.withdraw_requester("a").unwrap();
        coordinator.probe(&identity).await.unwrap();
        assert_eq!(wakes.pending_count(), 0);
        assert!(coordinator.store().is_empty());
    }
}
