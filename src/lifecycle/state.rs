//! # Lifecycle states of a probe instance.
//!
//! Every probe instance is in exactly one [`LifecycleState`] at any instant.
//! Transitions are applied serially on the probe's private driver task, so
//! observers never see a half-applied transition.
//!
//! ```text
//!             enable               start
//!   Disabled ────────► Enabled ────────► Running
//!      ▲                  │ ▲               │
//!      │     disable      │ └──────────────-┘
//!      └──────────────────┘       stop
//!
//!   disable while Running stops first, then disables.
//!   start while Disabled enables first, then starts.
//! ```

/// State of a probe instance.
///
/// `Disabled` is both the initial state and the terminal-for-session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Not consuming any resources; no data is produced.
    Disabled,
    /// Passively ready: opportunistic sources subscribed, no active run.
    Enabled,
    /// Actively producing data under an exclusivity guard.
    Running,
}

impl LifecycleState {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleState::Disabled => "disabled",
            LifecycleState::Enabled => "enabled",
            LifecycleState::Running => "running",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}
