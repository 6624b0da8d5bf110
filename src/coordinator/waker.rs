//! # Wake scheduling: the host alarm boundary.
//!
//! The coordinator programs wakes through [`WakeScheduler`], the abstraction
//! over the host's alarm primitive: `schedule(at, repeat?, exact) → token`,
//! `cancel(token)`. Replacing a probe's wake is idempotent — the coordinator
//! cancels the previous token before programming a new one, so there is
//! never more than one pending wake per probe identity.
//!
//! [`TimerWakes`] is the in-process implementation driving tokio timers; a
//! host integration (alarm manager, RTC wake) implements the same trait.
//! The `exact` flag is carried for such hosts — an inexact wake may be
//! coalesced or delayed for efficiency; in-process timers always fire on
//! time, so [`TimerWakes`] does not interpret it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::time;
use tokio_util::sync::CancellationToken;

/// Callback invoked at each fire time.
pub type WakeFn = Arc<dyn Fn() + Send + Sync>;

/// Handle to one programmed wake.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WakeToken(u64);

impl WakeToken {
    /// Creates a token from a scheduler-assigned id. Host scheduler
    /// implementations mint these; the coordinator only passes them back.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the scheduler-assigned id.
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Host alarm primitive: absolute-time wakes, optionally repeating.
pub trait WakeScheduler: Send + Sync + 'static {
    /// Programs a wake at `at`, then every `repeat` if given. `fire` is
    /// invoked at each fire time until the token is cancelled.
    fn schedule(
        &self,
        at: SystemTime,
        repeat: Option<Duration>,
        exact: bool,
        fire: WakeFn,
    ) -> WakeToken;

    /// Cancels a programmed wake. Idempotent; a token may be cancelled after
    /// it has already fired (one-shot) without effect.
    fn cancel(&self, token: &WakeToken);
}

/// In-process wake scheduler backed by tokio timers.
///
/// One timer task per programmed wake; cancellation is cooperative through a
/// per-wake token. Must be used inside a tokio runtime.
pub struct TimerWakes {
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, CancellationToken>>>,
}

impl TimerWakes {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of currently pending wakes.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("wake table poisoned").len()
    }
}

impl Default for TimerWakes {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeScheduler for TimerWakes {
    fn schedule(
        &self,
        at: SystemTime,
        repeat: Option<Duration>,
        _exact: bool,
        fire: WakeFn,
    ) -> WakeToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.pending
            .lock()
            .expect("wake table poisoned")
            .insert(id, cancel.clone());

        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            let mut next = at;
            loop {
                let delay = next
                    .duration_since(SystemTime::now())
                    .unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = time::sleep(delay) => {}
                    _ = cancel.cancelled() => break,
                }
                fire();
                match repeat.filter(|p| !p.is_zero()) {
                    Some(period) => next += period,
                    None => break,
                }
            }
            pending.lock().expect("wake table poisoned").remove(&id);
        });
        WakeToken(id)
    }

    fn cancel(&self, token: &WakeToken) {
        if let Some(cancel) = self
            .pending
            .lock()
            .expect("wake table poisoned")
            .get(&token.0)
        {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn fire_into(tx: mpsc::UnboundedSender<()>) -> WakeFn {
        Arc::new(move || {
            let _ = tx.send(());
        })
    }

    #[tokio::test]
    async fn test_one_shot_wake_fires_once() {
        let wakes = TimerWakes::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        wakes.schedule(
            SystemTime::now() + Duration::from_millis(20),
            None,
            false,
            fire_into(tx),
        );

        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("wake did not fire")
            .unwrap();
        // Channel closes once the timer task drops the sender: one-shot.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_prevents_firing() {
        let wakes = TimerWakes::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let token = wakes.schedule(
            SystemTime::now() + Duration::from_millis(200),
            None,
            false,
            fire_into(tx),
        );
        wakes.cancel(&token);

        // The timer task exits without firing; the channel just closes.
        assert!(
            tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timer task did not exit")
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_repeating_wake_fires_again() {
        let wakes = TimerWakes::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let token = wakes.schedule(
            SystemTime::now() + Duration::from_millis(10),
            Some(Duration::from_millis(25)),
            false,
            fire_into(tx),
        );

        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("repeat wake stalled")
                .unwrap();
        }
        wakes.cancel(&token);
    }

    #[tokio::test]
    async fn test_past_fire_time_fires_immediately() {
        let wakes = TimerWakes::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        wakes.schedule(
            SystemTime::now() - Duration::from_secs(5),
            None,
            false,
            fire_into(tx),
        );

        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("overdue wake did not fire")
            .unwrap();
    }
}
