//! # Schedule resolution: merging outstanding requests into one next run.
//!
//! Pure computation, re-run whenever the request set for a probe changes or
//! a scheduled run completes. No clock access — `now` is a parameter — so
//! every edge case is directly testable.
//!
//! ## Algorithm
//! 1. Empty request set → no next run (the caller cancels any pending wake).
//! 2. Per request, compute a candidate next-run time:
//!    - first run ever (no last-run recorded) → `now`;
//!    - run-once request (merged period none/zero) → `now` if submitted
//!      after the last run, else satisfied and excluded;
//!    - repeating → `last_run + period`; a candidate already in the past is
//!      advanced to the earliest instant ≥ `now` congruent to the
//!      `(start, period)` arithmetic progression (or `now` with no start).
//!    - A candidate before the window opens moves up to `start`; one past
//!      `end` is excluded.
//! 3. `next_run` = minimum surviving candidate — the soonest requester is
//!    satisfied first; there is no priority beyond recency.
//! 4. `period` = minimum period among surviving repeating requests (used to
//!    program a repeating rather than one-shot wake).
//! 5. `exact` = true iff any surviving request demands exact timing:
//!    strictness dominates opportunism when they conflict.
//!
//! Durations merge the other way: [`stop_after`] takes the **maximum**
//! requested duration, so no requester's window is cut short.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::requests::{Schedule, ScheduleRequest};

/// The merged outcome for one probe: when to run next, how often to repeat,
/// and whether the wake must be exact.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedSchedule {
    /// Absolute time of the next run.
    pub next_run: SystemTime,
    /// Minimum repeat period among surviving repeating requests; `None`
    /// when only run-once requests survive.
    pub period: Option<Duration>,
    /// Whether any surviving request demands exact timing.
    pub exact: bool,
}

/// Merges all outstanding requests for a probe into the next run.
///
/// Returns `None` when no request yields a satisfiable candidate — not an
/// error; the caller cancels any pending wake.
pub fn resolve(
    requests: &[ScheduleRequest],
    defaults: &Schedule,
    last_run: Option<SystemTime>,
    now: SystemTime,
) -> Option<ResolvedSchedule> {
    let mut next_run: Option<SystemTime> = None;
    let mut period: Option<Duration> = None;
    let mut exact = false;

    for request in requests {
        let merged = request.schedule.merged(defaults);
        let Some(candidate) = candidate(request, &merged, last_run, now) else {
            continue;
        };

        next_run = Some(match next_run {
            Some(best) => best.min(candidate),
            None => candidate,
        });
        if let Some(p) = merged.repeat_period() {
            period = Some(match period {
                Some(best) => best.min(p),
                None => p,
            });
        }
        exact |= merged.strict;
    }

    next_run.map(|next_run| ResolvedSchedule {
        next_run,
        period,
        exact,
    })
}

/// Maximum run duration across requests for a duration-bounded probe.
///
/// The companion stop wake is scheduled at `run start + stop_after`.
pub fn stop_after(requests: &[ScheduleRequest], defaults: &Schedule) -> Option<Duration> {
    requests
        .iter()
        .filter_map(|r| r.schedule.merged(defaults).duration)
        .max()
}

/// Candidate next-run time for one request, `None` when excluded.
fn candidate(
    request: &ScheduleRequest,
    merged: &Schedule,
    last_run: Option<SystemTime>,
    now: SystemTime,
) -> Option<SystemTime> {
    let mut at = match last_run {
        // The probe's very first run ever.
        None => now,
        Some(last) => match merged.repeat_period() {
            // Run once: satisfied unless submitted after the last run.
            None => {
                let fresh = request.submitted.map_or(true, |s| s > last);
                if !fresh {
                    return None;
                }
                now
            }
            Some(period) => {
                let next = last + period;
                if next < now {
                    // Stale: advance along the (start, period) progression
                    // instead of re-firing immediately.
                    match merged.start {
                        Some(start) => advance_congruent(start, period, now),
                        None => now,
                    }
                } else {
                    next
                }
            }
        },
    };

    if let Some(start) = merged.start {
        if at < start {
            at = start;
        }
    }
    if let Some(end) = merged.end {
        if at > end {
            return None;
        }
    }
    Some(at)
}

/// Earliest instant `>= now` of the arithmetic progression
/// `start + k * period`.
fn advance_congruent(start: SystemTime, period: Duration, now: SystemTime) -> SystemTime {
    if start >= now {
        return start;
    }
    let start_ms = epoch_millis(start);
    let now_ms = epoch_millis(now);
    let period_ms = period.as_millis().max(1);
    let steps = (now_ms - start_ms).div_ceil(period_ms);
    UNIX_EPOCH + Duration::from_millis((start_ms + steps * period_ms) as u64)
}

fn epoch_millis(t: SystemTime) -> u128 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}
