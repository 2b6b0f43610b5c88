//! Round Scheduler
//!
//! The state machine advancing the shared round through
//! `waiting -> flying -> crashed -> waiting (next round)`, forever.
//!
//! Every operation is idempotent against redundant or concurrent callers:
//! multiple driver processes may call `start`/`tick`/`next` simultaneously
//! and at most one write wins each transition via the store's CAS. Losers
//! observe the new phase on their next read and degrade to no-ops - wrong
//! phase is never an error, only an unreachable store is.
//!
//! Collaborator side effects (settlement, history, announcements) fire
//! through [`RoundHooks`] exactly once per transition: only the CAS winner
//! calls them, and the persisted phase keyed by `round_id` is the dedup
//! marker that survives process restarts.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::core::clock;
use crate::core::multiplier::{multiplier_at, Multiplier};
use crate::core::rng::XorshiftRng;
use crate::game::crash_point::{self, Mode};
use crate::game::round::{Phase, Round, RoundSnapshot};
use crate::game::store::{RoundPatch, RoundStore, StoreError};

/// The scheduler's mutating entry points, as named over the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceAction {
    /// `waiting -> flying` once the betting window has elapsed.
    Start,
    /// Recompute the multiplier; `flying -> crashed` at the threshold.
    Tick,
    /// `crashed -> waiting` with the next round id.
    Next,
}

/// Collaborator callbacks fired on phase transitions.
///
/// Called by the CAS winner only, so each fires at most once per round.
pub trait RoundHooks: Send + Sync + 'static {
    /// The flight ended: settle outstanding bets as losses and append the
    /// terminal multiplier to the round history.
    fn on_round_crashed(&self, round: &Round);

    /// A new round opened for betting; its crash point is already fixed.
    fn on_round_opened(&self, round: &Round);
}

/// Hooks implementation that only logs. Used when no collaborator is wired.
#[derive(Debug, Default, Clone)]
pub struct LogHooks;

impl RoundHooks for LogHooks {
    fn on_round_crashed(&self, round: &Round) {
        info!(
            round_id = round.round_id,
            multiplier = %round.multiplier,
            "round crashed; settling open bets as losses"
        );
    }

    fn on_round_opened(&self, round: &Round) {
        info!(
            round_id = round.round_id,
            crash_point = %round.crash_point,
            "round open for bets"
        );
    }
}

/// The round scheduler.
pub struct Scheduler<S: RoundStore, H: RoundHooks> {
    store: Arc<S>,
    hooks: H,
    config: GameConfig,
    boot_entropy: [u8; 32],
    mode: Mutex<Mode>,
}

impl<S: RoundStore, H: RoundHooks> Scheduler<S, H> {
    /// Create a scheduler over a store.
    ///
    /// `boot_entropy` seeds per-round crash-point draws; fix it in tests
    /// for a reproducible round sequence.
    pub fn new(store: Arc<S>, hooks: H, config: GameConfig, boot_entropy: [u8; 32]) -> Self {
        let mode = Mutex::new(config.mode);
        Self {
            store,
            hooks,
            config,
            boot_entropy,
            mode,
        }
    }

    /// Switch the generator mode. Takes effect when the next round's crash
    /// point is generated; the current round is never regenerated.
    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
        info!(?mode, "crash-point generator mode switched");
    }

    /// The mode the next round will be generated with.
    pub fn mode(&self) -> Mode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read-only snapshot of the current round, with the live multiplier
    /// derived while flying. Bootstraps the first round if none exists.
    pub fn current(&self) -> Result<RoundSnapshot, StoreError> {
        let round = self.read_or_bootstrap()?;
        Ok(self.live_snapshot(&round))
    }

    /// Dispatch one advance operation.
    pub fn advance(&self, action: AdvanceAction) -> Result<RoundSnapshot, StoreError> {
        match action {
            AdvanceAction::Start => self.start(),
            AdvanceAction::Tick => self.tick(),
            AdvanceAction::Next => self.next(),
        }
    }

    /// Transition `waiting -> flying`.
    ///
    /// Guarded: no-ops (returning the unchanged snapshot) unless the phase
    /// is `waiting` and the full betting window has elapsed, so a racing
    /// driver can never shorten the window for players still placing bets.
    pub fn start(&self) -> Result<RoundSnapshot, StoreError> {
        let round = self.read_or_bootstrap()?;

        if round.phase != Phase::Waiting {
            return Ok(self.live_snapshot(&round));
        }
        if clock::elapsed(round.phase_start_at) < self.config.waiting_duration {
            debug!(round_id = round.round_id, "start called before betting window elapsed");
            return Ok(round.snapshot());
        }

        let patch = RoundPatch {
            round_id: None,
            phase: Phase::Flying,
            multiplier: Multiplier::ONE,
            crash_point: None,
            phase_start_at: Utc::now(),
        };

        match self.store.cas_update(round.round_id, Phase::Waiting, patch) {
            Ok(updated) => {
                info!(
                    round_id = updated.round_id,
                    crash_point = %updated.crash_point,
                    "round took off"
                );
                Ok(updated.snapshot())
            }
            Err(StoreError::Conflict) => self.current(),
            Err(e) => Err(e),
        }
    }

    /// Recompute the multiplier while flying.
    ///
    /// Read-mostly: below the crash point this returns a derived snapshot
    /// without touching the store - the authoritative row only changes at
    /// phase boundaries, which is what bounds write amplification and lets
    /// any number of observers agree from `phase_start_at` alone. At or
    /// above the crash point it CAS-writes the `crashed` row and fires the
    /// settlement hooks once.
    pub fn tick(&self) -> Result<RoundSnapshot, StoreError> {
        let round = self.read_or_bootstrap()?;

        if round.phase != Phase::Flying {
            return Ok(round.snapshot());
        }

        let candidate = multiplier_at(clock::elapsed(round.phase_start_at));
        if candidate < round.crash_point {
            return Ok(round.snapshot_with(candidate));
        }

        let patch = RoundPatch {
            round_id: None,
            phase: Phase::Crashed,
            multiplier: round.crash_point,
            crash_point: None,
            phase_start_at: Utc::now(),
        };

        match self.store.cas_update(round.round_id, Phase::Flying, patch) {
            Ok(updated) => {
                info!(
                    round_id = updated.round_id,
                    multiplier = %updated.multiplier,
                    "round crashed"
                );
                self.hooks.on_round_crashed(&updated);
                Ok(updated.snapshot())
            }
            Err(StoreError::Conflict) => self.current(),
            Err(e) => Err(e),
        }
    }

    /// Transition `crashed -> waiting` with the next round id and a fresh
    /// crash point.
    ///
    /// Guarded symmetrically to [`start`](Self::start): the crashed result
    /// stays on display for the full `crashed_duration` even under
    /// redundant drivers.
    pub fn next(&self) -> Result<RoundSnapshot, StoreError> {
        let round = self.read_or_bootstrap()?;

        if round.phase != Phase::Crashed {
            return Ok(self.live_snapshot(&round));
        }
        if clock::elapsed(round.phase_start_at) < self.config.crashed_duration {
            debug!(round_id = round.round_id, "next called before display window elapsed");
            return Ok(round.snapshot());
        }

        let next_id = round.round_id + 1;
        let crash_point = self.generate_crash_point(next_id);

        let patch = RoundPatch {
            round_id: Some(next_id),
            phase: Phase::Waiting,
            multiplier: Multiplier::ONE,
            crash_point: Some(crash_point),
            phase_start_at: Utc::now(),
        };

        match self.store.cas_update(round.round_id, Phase::Crashed, patch) {
            Ok(updated) => {
                self.hooks.on_round_opened(&updated);
                Ok(updated.snapshot())
            }
            Err(StoreError::Conflict) => self.current(),
            Err(e) => Err(e),
        }
    }

    /// Read the current round, creating round 1 if none exists yet.
    ///
    /// Safe under racing bootstrappers: the loser of `create_initial`
    /// re-reads the winner's row.
    fn read_or_bootstrap(&self) -> Result<Round, StoreError> {
        if let Some(round) = self.store.read_current()? {
            return Ok(round);
        }

        let crash_point = self.generate_crash_point(1);
        let round = Round::initial(crash_point, Utc::now());

        match self.store.create_initial(round) {
            Ok(created) => {
                info!(round_id = created.round_id, "bootstrapped first round");
                self.hooks.on_round_opened(&created);
                Ok(created)
            }
            Err(StoreError::Conflict) => self
                .store
                .read_current()?
                .ok_or_else(|| StoreError::Unavailable("round vanished during bootstrap".into())),
            Err(e) => Err(e),
        }
    }

    /// Crash point for a given round id, from the per-round seeded RNG and
    /// the currently selected mode.
    fn generate_crash_point(&self, round_id: u64) -> Multiplier {
        let mut rng = XorshiftRng::for_round(&self.boot_entropy, round_id);
        crash_point::generate(self.mode(), &mut rng)
    }

    /// Snapshot with the multiplier derived from elapsed flight time.
    fn live_snapshot(&self, round: &Round) -> RoundSnapshot {
        if round.phase == Phase::Flying {
            let candidate = multiplier_at(clock::elapsed(round.phase_start_at));
            round.snapshot_with(candidate.min(round.crash_point))
        } else {
            round.snapshot()
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
