//! # Probe lifecycle controller: one actor per probe instance.
//!
//! Every probe instance owns exactly one private, FIFO execution context: an
//! unbounded directive channel drained by a single driver task. All
//! lifecycle transitions and all hook invocations happen on that driver, so
//! the state machine is race-free without any locking inside the hooks.
//!
//! Callers hold a [`ProbeHandle`]: `enable`/`start`/`stop`/`disable` only
//! enqueue a directive and return immediately (non-blocking, no return
//! value). Completion is observed through the state watch channel or the
//! event bus.
//!
//! ## Transition rules
//! ```text
//! Disabled ──enable──► on_enable ─► Enabled
//! Enabled ──start───► acquire guard, close gate, on_start ─► Running
//! Running ──stop────► cancel run token, on_stop, release guard,
//!                     rotate gate ─► Enabled
//! Running ──disable─► stop sequence ─► Enabled ─► on_disable ─► Disabled
//! Enabled ──disable─► on_disable ─► Disabled
//! Disabled ──start──► enable first, then start (one directive, atomic
//!                     from the caller's point of view)
//! self-transitions are no-ops (no duplicate hooks or notifications)
//! ```
//!
//! ## Failure policy
//! A hook error, panic, or grace overrun is caught on the driver, published
//! (`ProbeFailed` / `GraceExceeded`), and forces the probe to `Disabled`
//! with the run token cancelled and the guard released. One probe's failure
//! never reaches another probe's driver.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::RuntimeConfig;
use crate::events::{Bus, Event, EventKind};
use crate::identity::ProbeIdentity;
use crate::lifecycle::exclusivity::{ExclusivityGuard, ExclusivitySource};
use crate::lifecycle::state::LifecycleState;
use crate::listeners::{ListenerRef, ListenerRegistry, SubscriptionGate};
use crate::probes::{DataRecord, Delivery, ProbeRef};

/// Lifecycle directive, processed FIFO on the probe's driver task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Directive {
    Enable,
    Start,
    Stop,
    Disable,
}

/// Execution context handed to every hook invocation.
///
/// Carries the probe's identity, the emitter into its listener registry, a
/// sender for self-directives, and the current run token. Cloneable so
/// adapters can move it into spawned sampling tasks.
#[derive(Clone)]
pub struct ProbeContext {
    identity: ProbeIdentity,
    registry: Arc<ListenerRegistry>,
    directives: mpsc::UnboundedSender<Directive>,
    run_token: CancellationToken,
}

impl ProbeContext {
    /// Returns the owning probe's identity.
    pub fn identity(&self) -> &ProbeIdentity {
        &self.identity
    }

    /// Returns the current run token. Cancelled when the run must wind down.
    pub fn run_token(&self) -> CancellationToken {
        self.run_token.clone()
    }

    /// Stamps and delivers one record to the probe's current subscribers.
    pub async fn emit(&self, record: DataRecord) {
        self.registry.deliver(record).await;
    }

    /// Requests a stop on the probe's own execution context. Used by
    /// terminal probes when their finite source is exhausted.
    pub fn request_stop(&self) {
        let _ = self.directives.send(Directive::Stop);
    }
}

/// Cloneable, non-blocking handle to one probe instance.
#[derive(Clone)]
pub struct ProbeHandle {
    identity: ProbeIdentity,
    tx: mpsc::UnboundedSender<Directive>,
    state_rx: watch::Receiver<LifecycleState>,
    registry: Arc<ListenerRegistry>,
    gate: Option<Arc<SubscriptionGate>>,
    auto_disable: bool,
}

impl ProbeHandle {
    /// Returns the probe's identity.
    pub fn identity(&self) -> &ProbeIdentity {
        &self.identity
    }

    /// Returns the current lifecycle state (snapshot).
    pub fn state(&self) -> LifecycleState {
        *self.state_rx.borrow()
    }

    /// Returns a watch receiver observing every state change.
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state_rx.clone()
    }

    /// Enqueues an enable transition.
    pub fn enable(&self) {
        let _ = self.tx.send(Directive::Enable);
    }

    /// Enqueues a start transition (auto-enables from `Disabled`).
    pub fn start(&self) {
        let _ = self.tx.send(Directive::Start);
    }

    /// Enqueues a stop transition.
    pub fn stop(&self) {
        let _ = self.tx.send(Directive::Stop);
    }

    /// Enqueues a disable transition.
    pub fn disable(&self) {
        let _ = self.tx.send(Directive::Disable);
    }

    /// Subscribes a listener to this probe's output.
    ///
    /// For terminal probes a subscription made while a run is in progress is
    /// deferred until the run ends. Idempotent by listener id; returns
    /// `true` if the listener was newly admitted.
    pub fn subscribe(&self, listener: ListenerRef) -> bool {
        match &self.gate {
            Some(gate) => gate.subscribe(&self.registry, listener),
            None => self.registry.add(listener),
        }
    }

    /// Unsubscribes a listener by id (live or deferred). Returns `true` if
    /// it was registered.
    ///
    /// When the last listener leaves and the auto-disable policy is on, a
    /// disable directive is enqueued — an empty registry means no one wants
    /// data.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let dequeued = self.gate.as_ref().is_some_and(|g| g.discard(id));
        let removed = self.registry.remove(id);
        if (removed || dequeued) && !self.has_listeners() && self.auto_disable {
            self.disable();
        }
        removed || dequeued
    }

    /// True while any listener is live or queued for the next run.
    pub fn has_listeners(&self) -> bool {
        !self.registry.is_empty() || self.gate.as_ref().is_some_and(|g| g.queued_len() > 0)
    }
}

/// Spawns the driver task for one probe instance and returns its handle.
pub fn spawn_probe(
    probe: ProbeRef,
    identity: ProbeIdentity,
    delivery: Delivery,
    bus: Bus,
    exclusivity: Arc<dyn ExclusivitySource>,
    cfg: &RuntimeConfig,
) -> ProbeHandle {
    let (driver, handle) = Driver::new(probe, identity, delivery, bus, exclusivity, cfg);
    tokio::spawn(driver.run());
    handle
}

/// Hook selector, used by the shared hook runner.
#[derive(Clone, Copy, Debug)]
enum Hook {
    Enable,
    Start,
    Stop,
    Disable,
}

impl Hook {
    fn name(self) -> &'static str {
        match self {
            Hook::Enable => "on_enable",
            Hook::Start => "on_start",
            Hook::Stop => "on_stop",
            Hook::Disable => "on_disable",
        }
    }
}

/// The per-probe driver: owns the state field and runs all hooks.
struct Driver {
    probe: ProbeRef,
    identity: ProbeIdentity,
    uri: Arc<str>,
    state: LifecycleState,
    registry: Arc<ListenerRegistry>,
    gate: Option<Arc<SubscriptionGate>>,
    exclusivity: Arc<dyn ExclusivitySource>,
    guard: Option<ExclusivityGuard>,
    run_token: CancellationToken,
    watch_tx: watch::Sender<LifecycleState>,
    bus: Bus,
    grace: Option<Duration>,
    auto_disable: bool,
    self_tx: mpsc::WeakUnboundedSender<Directive>,
    rx: mpsc::UnboundedReceiver<Directive>,
}

impl Driver {
    fn new(
        probe: ProbeRef,
        identity: ProbeIdentity,
        delivery: Delivery,
        bus: Bus,
        exclusivity: Arc<dyn ExclusivitySource>,
        cfg: &RuntimeConfig,
    ) -> (Self, ProbeHandle) {
        let uri = identity.uri_arc();
        let (tx, rx) = mpsc::unbounded_channel();
        let (watch_tx, state_rx) = watch::channel(LifecycleState::Disabled);
        let registry = Arc::new(ListenerRegistry::new(uri.to_string(), bus.clone()));
        let gate = match delivery {
            Delivery::Terminal => Some(Arc::new(SubscriptionGate::new())),
            Delivery::Continuous => None,
        };

        let self_tx = tx.downgrade();
        let handle = ProbeHandle {
            identity: identity.clone(),
            tx,
            state_rx,
            registry: Arc::clone(&registry),
            gate: gate.clone(),
            auto_disable: cfg.auto_disable,
        };

        let driver = Self {
            probe,
            identity,
            uri,
            state: LifecycleState::Disabled,
            registry,
            gate,
            exclusivity,
            guard: None,
            run_token: CancellationToken::new(),
            watch_tx,
            bus,
            grace: cfg.hook_grace(),
            auto_disable: cfg.auto_disable,
            self_tx,
            rx,
        };
        (driver, handle)
    }

    /// Drains directives until every handle (and in-flight context) is gone.
    ///
    /// The driver holds only a weak sender to its own channel, so the loop
    /// ends once the last handle and probe context drop.
    async fn run(mut self) {
        while let Some(directive) = self.rx.recv().await {
            self.apply(directive).await;
        }
        // Last handle dropped: wind down whatever is still active.
        if self.state != LifecycleState::Disabled {
            self.apply(Directive::Disable).await;
        }
    }

    async fn apply(&mut self, directive: Directive) {
        match directive {
            Directive::Enable => {
                self.enable().await;
            }
            Directive::Start => self.start().await,
            Directive::Stop => self.stop().await,
            Directive::Disable => self.disable().await,
        }
    }

    /// `Disabled → Enabled`. Returns `true` when the probe is enabled (or
    /// already was).
    async fn enable(&mut self) -> bool {
        match self.state {
            LifecycleState::Disabled => {
                if self.run_hook(Hook::Enable).await {
                    self.set_state(LifecycleState::Enabled);
                    true
                } else {
                    // Failed before leaving Disabled: nothing to tear down.
                    false
                }
            }
            _ => true,
        }
    }

    /// `Enabled → Running`, auto-enabling from `Disabled` first.
    async fn start(&mut self) {
        match self.state {
            LifecycleState::Running => {}
            LifecycleState::Disabled => {
                if self.enable().await {
                    self.start_from_enabled().await;
                }
            }
            LifecycleState::Enabled => self.start_from_enabled().await,
        }
    }

    async fn start_from_enabled(&mut self) {
        self.guard = Some(self.exclusivity.acquire(&self.uri));
        if let Some(gate) = &self.gate {
            gate.close();
        }
        self.run_token = CancellationToken::new();

        if self.run_hook(Hook::Start).await {
            self.set_state(LifecycleState::Running);
        } else {
            // Aborted start: never entered Running, so queued listeners
            // merge instead of rotating.
            self.run_token.cancel();
            self.guard = None;
            if let Some(gate) = &self.gate {
                gate.reopen(&self.registry);
            }
            self.set_state(LifecycleState::Disabled);
        }
    }

    /// `Running → Enabled`.
    async fn stop(&mut self) {
        if self.state != LifecycleState::Running {
            return;
        }
        if self.wind_down().await {
            self.set_state(LifecycleState::Enabled);
            self.quiesce_if_empty();
        } else {
            self.set_state(LifecycleState::Disabled);
        }
    }

    /// `Enabled → Disabled`, stopping first from `Running`.
    async fn disable(&mut self) {
        match self.state {
            LifecycleState::Disabled => return,
            LifecycleState::Running => {
                if self.wind_down().await {
                    self.set_state(LifecycleState::Enabled);
                } else {
                    self.set_state(LifecycleState::Disabled);
                    return;
                }
            }
            LifecycleState::Enabled => {}
        }
        // on_disable failure is already reported; Disabled either way.
        let _ = self.run_hook(Hook::Disable).await;
        self.set_state(LifecycleState::Disabled);
    }

    /// Cancels the run token, runs `on_stop` under grace, releases the
    /// guard, and rotates the gate. Returns `false` on a hook failure.
    async fn wind_down(&mut self) -> bool {
        self.run_token.cancel();
        let ok = self.run_hook(Hook::Stop).await;
        self.guard = None;
        if let Some(gate) = &self.gate {
            gate.rotate(&self.registry);
        }
        ok
    }

    /// After a run ends: an empty registry means no one wants data.
    fn quiesce_if_empty(&self) {
        if !self.auto_disable || !self.registry.is_empty() {
            return;
        }
        let queued = self.gate.as_ref().map_or(0, |g| g.queued_len());
        if queued == 0 {
            if let Some(tx) = self.self_tx.upgrade() {
                let _ = tx.send(Directive::Disable);
            }
        }
    }

    /// Updates the state field and notifies observers. Observers see the
    /// new state only after the corresponding hook has returned.
    fn set_state(&mut self, next: LifecycleState) {
        if self.state == next {
            return;
        }
        let prev = self.state;
        self.state = next;
        let _ = self.watch_tx.send(next);
        self.bus.publish(
            Event::now(EventKind::StateChanged)
                .with_probe(Arc::clone(&self.uri))
                .with_state(next)
                .with_prev(prev),
        );
    }

    /// Runs one hook with panic isolation and the grace timeout. Returns
    /// `true` on success (cooperative cancellation counts as success).
    async fn run_hook(&mut self, hook: Hook) -> bool {
        let probe = Arc::clone(&self.probe);
        let cx = self.context();
        let fut = async move {
            match hook {
                Hook::Enable => probe.on_enable(&cx).await,
                Hook::Start => probe.on_start(&cx).await,
                Hook::Stop => probe.on_stop(&cx).await,
                Hook::Disable => probe.on_disable(&cx).await,
            }
        };
        let caught = AssertUnwindSafe(fut).catch_unwind();

        let outcome = match self.grace {
            Some(grace) => match time::timeout(grace, caught).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => {
                    tracing::warn!(probe = %self.uri, hook = hook.name(), grace_ms = grace.as_millis() as u64, "hook exceeded grace; forcing disable");
                    self.bus.publish(
                        Event::now(EventKind::GraceExceeded)
                            .with_probe(Arc::clone(&self.uri))
                            .with_reason(hook.name())
                            .with_delay(grace),
                    );
                    return false;
                }
            },
            None => caught.await,
        };

        match outcome {
            Ok(Ok(())) => true,
            // Cancellation observed by the hook is a graceful exit.
            Ok(Err(crate::error::ProbeError::Canceled)) => true,
            Ok(Err(e)) => {
                tracing::warn!(probe = %self.uri, hook = hook.name(), error = %e, "hook failed; forcing disable");
                self.bus.publish(
                    Event::now(EventKind::ProbeFailed)
                        .with_probe(Arc::clone(&self.uri))
                        .with_reason(format!("{}: {}", hook.name(), e.as_message())),
                );
                false
            }
            Err(panic_err) => {
                let info = panic_info(&*panic_err);
                tracing::warn!(probe = %self.uri, hook = hook.name(), panic = %info, "hook panicked; forcing disable");
                self.bus.publish(
                    Event::now(EventKind::ProbeFailed)
                        .with_probe(Arc::clone(&self.uri))
                        .with_reason(format!("{}: panic: {info}", hook.name())),
                );
                false
            }
        }
    }

    fn context(&self) -> ProbeContext {
        let directives = self
            .self_tx
            .upgrade()
            .unwrap_or_else(new_detached_sender);
        ProbeContext {
            identity: self.identity.clone(),
            registry: Arc::clone(&self.registry),
            directives,
            run_token: self.run_token.clone(),
        }
    }
}

/// A sender whose receiver is already gone; sends are silently dropped.
fn new_detached_sender() -> mpsc::UnboundedSender<Directive> {
    let (tx, _rx) = mpsc::unbounded_channel();
    tx
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
    use crate::error::ProbeError;
    use crate::probes::Probe;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe that counts every hook invocation.
    #[derive(Default)]
    struct Counting {
        enables: AtomicUsize,
        starts: AtomicUsize,
        stops: AtomicUsize,
        disables: AtomicUsize,
    }

    #[async_trait]
    impl Probe for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn on_enable(&self, _cx: &ProbeContext) -> Result<(), ProbeError> {
            self.enables.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_start(&self, _cx: &ProbeContext) -> Result<(), ProbeError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_stop(&self, _cx: &ProbeContext) -> Result<(), ProbeError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_disable(&self, _cx: &ProbeContext) -> Result<(), ProbeError> {
            self.disables.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn driver_for(
        probe: ProbeRef,
        delivery: Delivery,
        bus: Bus,
    ) -> (Driver, ProbeHandle) {
        let cfg = RuntimeConfig::default();
        Driver::new(
            probe,
            ProbeIdentity::new("counting"),
            delivery,
            bus,
            Arc::new(crate::lifecycle::NoopExclusivity),
            &cfg,
        )
    }

    /// Reference model of the state machine: expected state and hook counts
    /// for a directive sequence.
    fn model(seq: &[Directive]) -> (LifecycleState, [usize; 4]) {
        use LifecycleState::*;
        let mut state = Disabled;
        let mut counts = [0usize; 4]; // enable, start, stop, disable
        for d in seq {
            match (*d, state) {
                (Directive::Enable, Disabled) => {
                    counts[0] += 1;
                    state = Enabled;
                }
                (Directive::Enable, _) => {}
                (Directive::Start, Running) => {}
                (Directive::Start, Disabled) => {
                    counts[0] += 1;
                    counts[1] += 1;
                    state = Running;
                }
                (Directive::Start, Enabled) => {
                    counts[1] += 1;
                    state = Running;
                }
                (Directive::Stop, Running) => {
                    counts[2] += 1;
                    state = Enabled;
                }
                (Directive::Stop, _) => {}
                (Directive::Disable, Disabled) => {}
                (Directive::Disable, Running) => {
                    counts[2] += 1;
                    counts[3] += 1;
                    state = Disabled;
                }
                (Directive::Disable, Enabled) => {
                    counts[3] += 1;
                    state = Disabled;
                }
            }
        }
        (state, counts)
    }

    /// Exhaustively enumerates every directive sequence up to depth 4 and
    /// checks the driver against the reference model: only legal states,
    /// exact hook-call parity, no duplicate transitions.
    #[tokio::test]
    async fn test_exhaustive_sequences_match_model() {
        let all = [
            Directive::Enable,
            Directive::Start,
            Directive::Stop,
            Directive::Disable,
        ];

        // All 340 sequences of length 1..=4.
        let mut sequences: Vec<Vec<Directive>> = Vec::new();
        let mut frontier: Vec<Vec<Directive>> = vec![Vec::new()];
        for _ in 0..4 {
            let mut next = Vec::new();
            for seq in &frontier {
                for d in all {
                    let mut s = seq.clone();
                    s.push(d);
                    next.push(s);
                }
            }
            sequences.extend(next.iter().cloned());
            frontier = next;
        }

        for seq in sequences {
            let probe = Arc::new(Counting::default());
            let bus = Bus::new(256);
            let mut rx = bus.subscribe();
            let (mut driver, _handle) =
                driver_for(probe.clone() as ProbeRef, Delivery::Continuous, bus);

            for d in &seq {
                driver.apply(*d).await;
            }

            let (want_state, want_counts) = model(&seq);
            assert_eq!(driver.state, want_state, "sequence {seq:?}");
            assert_eq!(
                probe.enables.load(Ordering::SeqCst),
                want_counts[0],
                "enables for {seq:?}"
            );
            assert_eq!(
                probe.starts.load(Ordering::SeqCst),
                want_counts[1],
                "starts for {seq:?}"
            );
            assert_eq!(
                probe.stops.load(Ordering::SeqCst),
                want_counts[2],
                "stops for {seq:?}"
            );
            assert_eq!(
                probe.disables.load(Ordering::SeqCst),
                want_counts[3],
                "disables for {seq:?}"
            );

            // Every published transition must be one of the four legal pairs.
            use LifecycleState::*;
            while let Ok(ev) = rx.try_recv() {
                if ev.kind != EventKind::StateChanged {
                    continue;
                }
                let pair = (ev.prev.unwrap(), ev.state.unwrap());
                assert!(
                    matches!(
                        pair,
                        (Disabled, Enabled)
                            | (Enabled, Running)
                            | (Running, Enabled)
                            | (Enabled, Disabled)
                    ),
                    "illegal transition {pair:?} in {seq:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_double_disable_is_idempotent() {
        let probe = Arc::new(Counting::default());
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let (mut driver, _handle) =
            driver_for(probe.clone() as ProbeRef, Delivery::Continuous, bus);

        driver.apply(Directive::Enable).await;
        driver.apply(Directive::Disable).await;
        driver.apply(Directive::Disable).await;

        assert_eq!(probe.disables.load(Ordering::SeqCst), 1);

        let mut disabled_notifications = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::StateChanged && ev.state == Some(LifecycleState::Disabled) {
                disabled_notifications += 1;
            }
        }
        assert_eq!(disabled_notifications, 1);
    }

    #[tokio::test]
    async fn test_start_from_disabled_auto_enables() {
        let probe = Arc::new(Counting::default());
        let (mut driver, _handle) =
            driver_for(probe.clone() as ProbeRef, Delivery::Continuous, Bus::new(64));

        driver.apply(Directive::Start).await;

        assert_eq!(driver.state, LifecycleState::Running);
        assert_eq!(probe.enables.load(Ordering::SeqCst), 1);
        assert_eq!(probe.starts.load(Ordering::SeqCst), 1);
    }

    /// Probe whose `on_start` fails.
    struct FailingStart;

    #[async_trait]
    impl Probe for FailingStart {
        fn name(&self) -> &str {
            "failing"
        }

        async fn on_start(&self, _cx: &ProbeContext) -> Result<(), ProbeError> {
            Err(ProbeError::failed("sensor offline"))
        }
    }

    #[tokio::test]
    async fn test_failed_start_forces_disabled() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let (mut driver, _handle) =
            driver_for(Arc::new(FailingStart), Delivery::Continuous, bus);

        driver.apply(Directive::Start).await;

        assert_eq!(driver.state, LifecycleState::Disabled);
        assert!(driver.guard.is_none());

        let mut failed = false;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::ProbeFailed {
                failed = true;
                assert!(ev.reason.as_deref().unwrap().contains("on_start"));
            }
        }
        assert!(failed);
    }

    /// Probe whose `on_stop` panics.
    struct PanickingStop;

    #[async_trait]
    impl Probe for PanickingStop {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn on_start(&self, _cx: &ProbeContext) -> Result<(), ProbeError> {
            Ok(())
        }

        async fn on_stop(&self, _cx: &ProbeContext) -> Result<(), ProbeError> {
            panic!("stop boom");
        }
    }

    #[tokio::test]
    async fn test_panicking_stop_is_caught_and_forces_disabled() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let (mut driver, _handle) =
            driver_for(Arc::new(PanickingStop), Delivery::Continuous, bus);

        driver.apply(Directive::Start).await;
        driver.apply(Directive::Stop).await;

        assert_eq!(driver.state, LifecycleState::Disabled);

        let mut failed = false;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::ProbeFailed {
                failed = true;
                assert!(ev.reason.as_deref().unwrap().contains("panic"));
            }
        }
        assert!(failed);
    }

    /// Probe whose `on_stop` exceeds the grace period.
    struct SlowStop;

    #[async_trait]
    impl Probe for SlowStop {
        fn name(&self) -> &str {
            "slow"
        }

        async fn on_start(&self, _cx: &ProbeContext) -> Result<(), ProbeError> {
            Ok(())
        }

        async fn on_stop(&self, _cx: &ProbeContext) -> Result<(), ProbeError> {
            time::sleep(Duration::from_secs(600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_grace_overrun_forces_disabled() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let mut cfg = RuntimeConfig::default();
        cfg.grace = Duration::from_millis(50);
        let (mut driver, _handle) = Driver::new(
            Arc::new(SlowStop),
            ProbeIdentity::new("slow"),
            Delivery::Continuous,
            bus,
            Arc::new(crate::lifecycle::NoopExclusivity),
            &cfg,
        );

        driver.apply(Directive::Start).await;
        driver.apply(Directive::Stop).await;

        assert_eq!(driver.state, LifecycleState::Disabled);

        let mut grace_exceeded = false;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::GraceExceeded {
                grace_exceeded = true;
                assert_eq!(ev.reason.as_deref(), Some("on_stop"));
            }
        }
        assert!(grace_exceeded);
    }

    #[tokio::test]
    async fn test_deferred_subscription_replays_after_run() {
        use crate::listeners::DataListener;

        struct Nop(String);

        #[async_trait]
        impl DataListener for Nop {
            fn id(&self) -> &str {
                &self.0
            }

            async fn on_data(&self, _record: &DataRecord) {}
        }

        let probe = Arc::new(Counting::default());
        let (mut driver, handle) =
            driver_for(probe as ProbeRef, Delivery::Terminal, Bus::new(64));

        // Early subscriber is live for the first run.
        handle.subscribe(Arc::new(Nop("early".into())));
        driver.apply(Directive::Start).await;

        // Mid-run subscriber must not appear in the live registry.
        handle.subscribe(Arc::new(Nop("late".into())));
        assert_eq!(driver.registry.len(), 1);

        driver.apply(Directive::Stop).await;

        // After the run: late promoted exactly once, early rotated out.
        let ids: Vec<String> = driver
            .registry
            .snapshot()
            .iter()
            .map(|l| l.id().to_string())
            .collect();
        assert_eq!(ids, vec!["late".to_string()]);
    }

    #[tokio::test]
    async fn test_run_token_cancelled_on_stop() {
        struct TokenWatcher {
            token: std::sync::Mutex<Option<CancellationToken>>,
        }

        #[async_trait]
        impl Probe for TokenWatcher {
            fn name(&self) -> &str {
                "watcher"
            }

            async fn on_start(&self, cx: &ProbeContext) -> Result<(), ProbeError> {
                *self.token.lock().unwrap() = Some(cx.run_token());
                Ok(())
            }
        }

        let probe = Arc::new(TokenWatcher {
            token: std::sync::Mutex::new(None),
        });
        let (mut driver, _handle) =
            driver_for(probe.clone(), Delivery::Continuous, Bus::new(64));

        driver.apply(Directive::Start).await;
        let token = probe.token.lock().unwrap().clone().unwrap();
        assert!(!token.is_cancelled());

        driver.apply(Directive::Stop).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_spawned_handle_round_trip() {
        let probe = Arc::new(Counting::default());
        let cfg = RuntimeConfig::default();
        let handle = spawn_probe(
            probe.clone() as ProbeRef,
            ProbeIdentity::new("counting"),
            Delivery::Continuous,
            Bus::new(64),
            Arc::new(crate::lifecycle::NoopExclusivity),
            &cfg,
        );

        let mut watch = handle.watch_state();
        handle.start();

        // Wait for the driver to reach Running.
        while *watch.borrow() != LifecycleState::Running {
            watch.changed().await.unwrap();
        }
        assert_eq!(handle.state(), LifecycleState::Running);

        handle.disable();
        while *watch.borrow() != LifecycleState::Disabled {
            watch.changed().await.unwrap();
        }
        assert_eq!(probe.stops.load(Ordering::SeqCst), 1);
        assert_eq!(probe.disables.load(Ordering::SeqCst), 1);
    }
}
