//! # Schedule parameters and per-requester schedule requests.
//!
//! Defines [`Schedule`], the optional scheduling parameters a requester may
//! attach to a request, and [`ScheduleRequest`], the immutable value stored
//! per `(requester, request_id)` key.
//!
//! A schedule is sparse: every field is optional and merges against the
//! probe type's default schedule (and the runtime's fallback) field-wise.
//! The merged period decides the repeat behavior — none or zero means the
//! request fires once and is then excluded from repeat scheduling until
//! resubmitted.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::identity::ProbeIdentity;

/// Scheduling parameters, all optional.
///
/// ### Field semantics
/// - `period`: repeat cadence; merged-out none/zero means run once
/// - `start`/`end`: bounding window; unset means unbounded on that side
/// - `duration`: how long a continuous probe keeps running per activation
/// - `opportunistic`: the wake may be delayed or batched by the host
/// - `strict`: the wake must fire at the exact computed time; dominates
///   opportunism when requests conflict
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Repeat cadence. `None` inherits the probe default; zero means once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Duration>,
    /// Earliest instant the probe may run for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<SystemTime>,
    /// Latest instant the probe may run for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<SystemTime>,
    /// Run duration for duration-bounded probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    /// Whether the host may delay or batch the wake for efficiency.
    #[serde(default = "default_true")]
    pub opportunistic: bool,
    /// Whether the wake must fire at the exact computed time.
    #[serde(default)]
    pub strict: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Schedule {
    /// All parameters unset: opportunistic, not strict.
    fn default() -> Self {
        Self {
            period: None,
            start: None,
            end: None,
            duration: None,
            opportunistic: true,
            strict: false,
        }
    }
}

impl Schedule {
    /// Returns a new schedule with the given repeat period.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    /// Returns a new schedule that runs once (explicit zero period).
    pub fn once(mut self) -> Self {
        self.period = Some(Duration::ZERO);
        self
    }

    /// Returns a new schedule with the given window start.
    pub fn with_start(mut self, start: SystemTime) -> Self {
        self.start = Some(start);
        self
    }

    /// Returns a new schedule with the given window end.
    pub fn with_end(mut self, end: SystemTime) -> Self {
        self.end = Some(end);
        self
    }

    /// Returns a new schedule with the given run duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Returns a new schedule with the given opportunism flag.
    pub fn with_opportunistic(mut self, opportunistic: bool) -> Self {
        self.opportunistic = opportunistic;
        self
    }

    /// Returns a new schedule with the given strictness flag.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Merges this schedule over `defaults`, field-wise.
    ///
    /// Set fields win; unset fields inherit. The boolean flags always come
    /// from `self` — a requester's opportunism/strictness is never widened
    /// by a default.
    pub fn merged(&self, defaults: &Schedule) -> Schedule {
        Schedule {
            period: self.period.or(defaults.period),
            start: self.start.or(defaults.start),
            end: self.end.or(defaults.end),
            duration: self.duration.or(defaults.duration),
            opportunistic: self.opportunistic,
            strict: self.strict,
        }
    }

    /// Returns the repeat period if this schedule repeats (non-zero period).
    pub fn repeat_period(&self) -> Option<Duration> {
        self.period.filter(|p| !p.is_zero())
    }

    /// True when the merged schedule means "run once".
    pub fn is_once(&self) -> bool {
        self.repeat_period().is_none()
    }
}

/// Unique key of a live request: `(requester, request_id)`.
///
/// A requester may hold at most one live request per `request_id`;
/// re-submitting the same key replaces the previous value (last-write-wins).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    /// Identity of the requesting consumer.
    pub requester: String,
    /// Requester-scoped request identifier.
    pub request_id: String,
}

impl RequestKey {
    /// Creates a request key.
    pub fn new(requester: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            requester: requester.into(),
            request_id: request_id.into(),
        }
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.requester, self.request_id)
    }
}

/// Immutable per-requester schedule request for one probe identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// Identity of the requesting consumer.
    pub requester: String,
    /// Requester-scoped request identifier.
    pub request_id: String,
    /// The probe this request schedules.
    pub probe: ProbeIdentity,
    /// Requested scheduling parameters (sparse).
    pub schedule: Schedule,
    /// When the store accepted this request. Stamped on `put`; a run-once
    /// request submitted before the probe's last run counts as satisfied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted: Option<SystemTime>,
}

impl ScheduleRequest {
    /// Creates a request; `submitted` is stamped by the store on `put`.
    pub fn new(
        requester: impl Into<String>,
        request_id: impl Into<String>,
        probe: ProbeIdentity,
        schedule: Schedule,
    ) -> Self {
        Self {
            requester: requester.into(),
            request_id: request_id.into(),
            probe,
            schedule,
            submitted: None,
        }
    }

    /// Returns the `(requester, request_id)` key of this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.requester.clone(), self.request_id.clone())
    }
}
