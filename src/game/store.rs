//! Round State Store
//!
//! The boundary to durable storage: a single current-round row behind a
//! read / create / compare-and-swap protocol. Any backend with optimistic
//! concurrency satisfies [`RoundStore`]; the in-memory implementation here
//! is the reference used by tests and single-process deployments.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::core::multiplier::Multiplier;
use crate::game::round::{Phase, Round};

/// Store errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The row's phase (or id) no longer matched at write time. Expected
    /// under concurrent drivers; callers degrade to a no-op.
    #[error("concurrent update won the race")]
    Conflict,

    /// The backing store could not be reached. Transient; callers retry
    /// with backoff.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Fields written by a phase transition.
///
/// `round_id` and `crash_point` are only set on the `crashed -> waiting`
/// transition; every transition rewrites phase, multiplier and the phase
/// start timestamp.
#[derive(Debug, Clone)]
pub struct RoundPatch {
    /// New round id (set only when opening the next round).
    pub round_id: Option<u64>,
    /// New phase.
    pub phase: Phase,
    /// New authoritative multiplier.
    pub multiplier: Multiplier,
    /// New crash point (set only when opening the next round).
    pub crash_point: Option<Multiplier>,
    /// Start of the new phase.
    pub phase_start_at: DateTime<Utc>,
}

/// The store contract the scheduler relies on.
pub trait RoundStore: Send + Sync + 'static {
    /// Read the current round, if any exists yet.
    fn read_current(&self) -> Result<Option<Round>, StoreError>;

    /// Create the initial round. Fails with [`StoreError::Conflict`] if a
    /// round already exists (a racing bootstrapper won); callers re-read.
    fn create_initial(&self, round: Round) -> Result<Round, StoreError>;

    /// Compare-and-swap update: applies `patch` only if the stored row
    /// still has `round_id` and `expected_phase`. This is the mechanism
    /// that makes concurrent advance calls safe - at most one caller's
    /// write wins a given transition.
    fn cas_update(
        &self,
        round_id: u64,
        expected_phase: Phase,
        patch: RoundPatch,
    ) -> Result<Round, StoreError>;
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// Mutex-guarded single-row store.
#[derive(Default)]
pub struct MemoryRoundStore {
    row: Mutex<Option<Round>>,
}

impl MemoryRoundStore {
    /// Create an empty store (no round yet; first caller bootstraps).
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoundStore for MemoryRoundStore {
    fn read_current(&self) -> Result<Option<Round>, StoreError> {
        let row = self
            .row
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))?;
        Ok(row.clone())
    }

    fn create_initial(&self, round: Round) -> Result<Round, StoreError> {
        let mut row = self
            .row
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))?;
        if row.is_some() {
            return Err(StoreError::Conflict);
        }
        *row = Some(round.clone());
        Ok(round)
    }

    fn cas_update(
        &self,
        round_id: u64,
        expected_phase: Phase,
        patch: RoundPatch,
    ) -> Result<Round, StoreError> {
        let mut row = self
            .row
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))?;

        let current = row.as_mut().ok_or(StoreError::Conflict)?;
        if current.round_id != round_id || current.phase != expected_phase {
            return Err(StoreError::Conflict);
        }

        if let Some(id) = patch.round_id {
            current.round_id = id;
        }
        current.phase = patch.phase;
        current.multiplier = patch.multiplier;
        if let Some(cp) = patch.crash_point {
            current.crash_point = cp;
        }
        // phase_start_at is monotone across writes to the row
        current.phase_start_at = patch.phase_start_at.max(current.phase_start_at);
        current.updated_at = Utc::now();

        Ok(current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting_round() -> Round {
        Round::initial(Multiplier::from_hundredths(250), Utc::now())
    }

    fn flying_patch(now: DateTime<Utc>) -> RoundPatch {
        RoundPatch {
            round_id: None,
            phase: Phase::Flying,
            multiplier: Multiplier::ONE,
            crash_point: None,
            phase_start_at: now,
        }
    }

    #[test]
    fn test_read_empty() {
        let store = MemoryRoundStore::new();
        assert!(store.read_current().unwrap().is_none());
    }

    #[test]
    fn test_create_initial_once() {
        let store = MemoryRoundStore::new();
        let created = store.create_initial(waiting_round()).unwrap();
        assert_eq!(created.round_id, 1);

        // A racing bootstrapper loses
        let second = store.create_initial(waiting_round());
        assert!(matches!(second, Err(StoreError::Conflict)));

        assert_eq!(store.read_current().unwrap().unwrap().round_id, 1);
    }

    #[test]
    fn test_cas_update_applies_patch() {
        let store = MemoryRoundStore::new();
        store.create_initial(waiting_round()).unwrap();

        let now = Utc::now();
        let updated = store.cas_update(1, Phase::Waiting, flying_patch(now)).unwrap();
        assert_eq!(updated.phase, Phase::Flying);
        assert_eq!(updated.round_id, 1);
        // Crash point untouched when the patch leaves it out
        assert_eq!(updated.crash_point, Multiplier::from_hundredths(250));
    }

    #[test]
    fn test_cas_rejects_stale_phase() {
        let store = MemoryRoundStore::new();
        store.create_initial(waiting_round()).unwrap();

        let now = Utc::now();
        store.cas_update(1, Phase::Waiting, flying_patch(now)).unwrap();

        // Second writer expected Waiting but the row moved on
        let second = store.cas_update(1, Phase::Waiting, flying_patch(now));
        assert!(matches!(second, Err(StoreError::Conflict)));
    }

    #[test]
    fn test_cas_rejects_stale_round_id() {
        let store = MemoryRoundStore::new();
        store.create_initial(waiting_round()).unwrap();

        let result = store.cas_update(99, Phase::Waiting, flying_patch(Utc::now()));
        assert!(matches!(result, Err(StoreError::Conflict)));
    }

    #[test]
    fn test_cas_on_empty_store_conflicts() {
        let store = MemoryRoundStore::new();
        let result = store.cas_update(1, Phase::Waiting, flying_patch(Utc::now()));
        assert!(matches!(result, Err(StoreError::Conflict)));
    }

    #[test]
    fn test_phase_start_never_rewinds() {
        let store = MemoryRoundStore::new();
        let round = waiting_round();
        let original_start = round.phase_start_at;
        store.create_initial(round).unwrap();

        // A skewed writer tries to set an older phase start
        let stale = original_start - chrono::TimeDelta::seconds(30);
        let updated = store.cas_update(1, Phase::Waiting, flying_patch(stale)).unwrap();
        assert_eq!(updated.phase_start_at, original_start);
    }

    #[test]
    fn test_next_round_patch_rolls_everything() {
        let store = MemoryRoundStore::new();
        store.create_initial(waiting_round()).unwrap();
        let now = Utc::now();
        store.cas_update(1, Phase::Waiting, flying_patch(now)).unwrap();
        store
            .cas_update(
                1,
                Phase::Flying,
                RoundPatch {
                    round_id: None,
                    phase: Phase::Crashed,
                    multiplier: Multiplier::from_hundredths(250),
                    crash_point: None,
                    phase_start_at: now,
                },
            )
            .unwrap();

        let next = store
            .cas_update(
                1,
                Phase::Crashed,
                RoundPatch {
                    round_id: Some(2),
                    phase: Phase::Waiting,
                    multiplier: Multiplier::ONE,
                    crash_point: Some(Multiplier::from_hundredths(410)),
                    phase_start_at: now,
                },
            )
            .unwrap();

        assert_eq!(next.round_id, 2);
        assert_eq!(next.phase, Phase::Waiting);
        assert_eq!(next.crash_point, Multiplier::from_hundredths(410));
        assert_eq!(next.multiplier, Multiplier::ONE);
    }
}
