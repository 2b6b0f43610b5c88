//! Round Clock
//!
//! Pure phase-duration arithmetic over the stored `phase_start_at` timestamp.
//! Every wait in the system is computed from the timestamp rather than from
//! an in-memory countdown, so a driver that restarts mid-phase sleeps only
//! the remainder of the phase, never the full duration again.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Time elapsed since a phase began, evaluated at an explicit `now`.
///
/// Returns zero if `now` is before `phase_start_at` (clock skew between
/// writer and reader), so downstream guards never see time run backwards.
#[inline]
pub fn elapsed_at(now: DateTime<Utc>, phase_start_at: DateTime<Utc>) -> Duration {
    (now - phase_start_at).to_std().unwrap_or(Duration::ZERO)
}

/// Time elapsed since a phase began, against the wall clock.
#[inline]
pub fn elapsed(phase_start_at: DateTime<Utc>) -> Duration {
    elapsed_at(Utc::now(), phase_start_at)
}

/// Time left in a phase of `total` length, evaluated at an explicit `now`.
///
/// Saturates at zero; callers treat zero as "phase is over, advance now".
#[inline]
pub fn remaining_at(
    now: DateTime<Utc>,
    phase_start_at: DateTime<Utc>,
    total: Duration,
) -> Duration {
    total.saturating_sub(elapsed_at(now, phase_start_at))
}

/// Time left in a phase of `total` length, against the wall clock.
#[inline]
pub fn remaining(phase_start_at: DateTime<Utc>, total: Duration) -> Duration {
    remaining_at(Utc::now(), phase_start_at, total)
}
