//! # Exclusivity guard acquired while a probe is `Running`.
//!
//! On a mobile host the `enable→start` transition must guarantee the device
//! will not suspend execution while data is actively produced (a wake lock).
//! probevisor abstracts that mechanism behind [`ExclusivitySource`]: the
//! driver acquires a guard before `on_start` and drops it after `on_stop`.
//!
//! The default [`NoopExclusivity`] does nothing — correct for hosts without
//! suspend semantics and for tests. A real host integration implements the
//! trait over its power-management API and releases in the guard's drop.

/// Source of exclusivity guards, one acquisition per probe run.
pub trait ExclusivitySource: Send + Sync + 'static {
    /// Acquires a guard for the named probe. Held for the whole `Running`
    /// interval; released on drop.
    fn acquire(&self, probe: &str) -> ExclusivityGuard;
}

/// Guard preventing host suspension while held. Releases on drop.
pub struct ExclusivityGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ExclusivityGuard {
    /// Creates a guard that runs `release` when dropped.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Creates a guard with no release action.
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for ExclusivityGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for ExclusivityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusivityGuard")
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// Exclusivity source that never blocks suspension.
pub struct NoopExclusivity;

impl ExclusivitySource for NoopExclusivity {
    fn acquire(&self, _probe: &str) -> ExclusivityGuard {
        ExclusivityGuard::noop()
    }
}
