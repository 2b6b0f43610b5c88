//! Round State Definitions
//!
//! The `Round` is the sole mutable entity in the system: one row, mutated
//! in place by the scheduler, read by everyone else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::multiplier::Multiplier;

// =============================================================================
// PHASE
// =============================================================================

/// Phase of the current round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Bets open; the round is counting down to takeoff.
    Waiting,
    /// Multiplier rising along the flight curve.
    Flying,
    /// Flight ended; terminal multiplier on display.
    Crashed,
}

// =============================================================================
// ROUND
// =============================================================================

/// The single current round record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Monotonically increasing round number, assigned at creation.
    pub round_id: u64,

    /// Current phase.
    pub phase: Phase,

    /// Authoritative multiplier. Only changes at phase boundaries; the
    /// intra-flight value is derived on demand from `phase_start_at`.
    pub multiplier: Multiplier,

    /// Terminal multiplier for this round. Fixed once the round enters
    /// `Waiting` and never regenerated mid-round.
    pub crash_point: Multiplier,

    /// When the current phase began. Every transition resets it.
    pub phase_start_at: DateTime<Utc>,

    /// Last write time; the store's "latest row" sort key.
    pub updated_at: DateTime<Utc>,
}

impl Round {
    /// The very first round, created on bootstrap.
    pub fn initial(crash_point: Multiplier, now: DateTime<Utc>) -> Self {
        Self {
            round_id: 1,
            phase: Phase::Waiting,
            multiplier: Multiplier::ONE,
            crash_point,
            phase_start_at: now,
            updated_at: now,
        }
    }

    /// Read-only snapshot of the stored state.
    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            round_id: self.round_id,
            phase: self.phase,
            multiplier: self.multiplier,
            crash_point: self.crash_point,
            phase_start_at: self.phase_start_at,
        }
    }

    /// Snapshot carrying a derived multiplier instead of the stored one.
    ///
    /// Used while flying, where the authoritative row still says 1.00 but
    /// the live value is computable by any reader.
    pub fn snapshot_with(&self, multiplier: Multiplier) -> RoundSnapshot {
        RoundSnapshot {
            multiplier,
            ..self.snapshot()
        }
    }
}

/// What clients and drivers see: the round without the store bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Round number.
    pub round_id: u64,
    /// Current phase.
    pub phase: Phase,
    /// Displayed multiplier (derived while flying).
    pub multiplier: Multiplier,
    /// Terminal multiplier for this round.
    pub crash_point: Multiplier,
    /// When the current phase began.
    pub phase_start_at: DateTime<Utc>,
}
