//! Client Sync Adapter
//!
//! Reconstructs a continuously-updating multiplier on the viewing side from
//! sparse server snapshots. Between snapshots the view recomputes the same
//! flight curve the server uses from `phase_start_at`, so it stays in step
//! without per-frame network traffic; each incoming snapshot resynchronizes
//! the authoritative fields, and a divergence beyond [`SNAP_TOLERANCE`]
//! snaps straight to the server value instead of easing - the correction is
//! visible but bounded, never unbounded drift. A snap is carried as a clock
//! correction, so subsequent frames keep tracking the server's timeline
//! rather than recomputing the old local one.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::core::clock;
use crate::core::multiplier::{multiplier_at, Multiplier, GROWTH_RATE};
use crate::game::round::{Phase, RoundSnapshot};

/// Divergence (in hundredths) beyond which the view snaps to the server
/// value: 0.50.
pub const SNAP_TOLERANCE: u32 = 50;

/// Local view of the current round.
#[derive(Debug, Clone)]
pub struct RoundView {
    snapshot: RoundSnapshot,
    displayed: Multiplier,
    /// Correction applied to the local clock after a snap; zero until the
    /// view drifts past tolerance, reset on every phase change.
    skew: TimeDelta,
}

impl RoundView {
    /// Build a view from the first snapshot received.
    pub fn new(snapshot: RoundSnapshot) -> Self {
        let displayed = match snapshot.phase {
            Phase::Waiting => Multiplier::ONE,
            Phase::Flying => snapshot.multiplier,
            Phase::Crashed => snapshot.crash_point,
        };
        Self {
            snapshot,
            displayed,
            skew: TimeDelta::zero(),
        }
    }

    /// Round currently being viewed.
    pub fn round_id(&self) -> u64 {
        self.snapshot.round_id
    }

    /// Phase currently being viewed.
    pub fn phase(&self) -> Phase {
        self.snapshot.phase
    }

    /// Last value produced by [`render_at`](Self::render_at).
    pub fn displayed(&self) -> Multiplier {
        self.displayed
    }

    /// Fold in a new server snapshot.
    ///
    /// Always resynchronizes `phase_start_at`, `crash_point` and the phase;
    /// the displayed value only jumps if the local recomputation has
    /// drifted past the tolerance (or the phase changed). A jump retunes
    /// the local clock so later frames continue from the server value
    /// rather than falling back onto the drifted curve.
    pub fn apply_snapshot(&mut self, snapshot: RoundSnapshot, now: DateTime<Utc>) {
        let phase_changed = snapshot.phase != self.snapshot.phase
            || snapshot.round_id != self.snapshot.round_id;
        self.snapshot = snapshot;

        if phase_changed {
            self.skew = TimeDelta::zero();
            self.displayed = self.target(now);
            return;
        }

        if self.snapshot.phase == Phase::Flying {
            let local = self.target(now);
            if local.abs_diff(snapshot.multiplier) > SNAP_TOLERANCE {
                self.skew = skew_for(
                    snapshot.multiplier,
                    clock::elapsed_at(now, snapshot.phase_start_at),
                );
                self.displayed = snapshot.multiplier;
            }
        }
    }

    /// Produce the multiplier to draw this frame, at an explicit `now`.
    pub fn render_at(&mut self, now: DateTime<Utc>) -> Multiplier {
        self.displayed = self.target(now);
        self.displayed
    }

    /// Produce the multiplier to draw this frame, against the wall clock.
    pub fn render(&mut self) -> Multiplier {
        self.render_at(Utc::now())
    }

    /// Where the view should be right now: held at 1.00 while waiting, the
    /// crash point while crashed, the recomputed curve (clamped to the
    /// crash point) while flying.
    fn target(&self, now: DateTime<Utc>) -> Multiplier {
        match self.snapshot.phase {
            Phase::Waiting => Multiplier::ONE,
            Phase::Crashed => self.snapshot.crash_point,
            Phase::Flying => {
                let elapsed = clock::elapsed_at(now + self.skew, self.snapshot.phase_start_at);
                multiplier_at(elapsed).min(self.snapshot.crash_point)
            }
        }
    }
}

/// Clock correction that makes the local curve pass through the server's
/// reported multiplier: solve `GROWTH_RATE ^ t = server` for `t` and take
/// the difference to the locally observed elapsed time.
fn skew_for(server: Multiplier, local_elapsed: Duration) -> TimeDelta {
    let server_secs = (server.to_f64().max(1.0).ln() / GROWTH_RATE.ln()).max(0.0);
    let server_elapsed = Duration::from_secs_f64(server_secs);

    TimeDelta::from_std(server_elapsed).unwrap_or_else(|_| TimeDelta::zero())
        - TimeDelta::from_std(local_elapsed).unwrap_or_else(|_| TimeDelta::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::time::Duration;

    fn snapshot(phase: Phase, started: DateTime<Utc>) -> RoundSnapshot {
        RoundSnapshot {
            round_id: 7,
            phase,
            multiplier: Multiplier::ONE,
            crash_point: Multiplier::from_hundredths(250),
            phase_start_at: started,
        }
    }

    #[test]
    fn test_waiting_holds_at_one() {
        let start = Utc::now();
        let mut view = RoundView::new(snapshot(Phase::Waiting, start));
        assert_eq!(view.render_at(start + TimeDelta::seconds(3)), Multiplier::ONE);
    }

    #[test]
    fn test_crashed_holds_at_crash_point() {
        let start = Utc::now();
        let mut view = RoundView::new(snapshot(Phase::Crashed, start));
        assert_eq!(
            view.render_at(start + TimeDelta::seconds(1)),
            Multiplier::from_hundredths(250)
        );
    }

    #[test]
    fn test_flying_matches_server_curve() {
        let start = Utc::now();
        let mut view = RoundView::new(snapshot(Phase::Flying, start));

        // Local interpolation after t seconds equals the server tick()
        // output at the same elapsed time
        for ms in [500u64, 1_000, 5_000, 12_100] {
            let now = start + TimeDelta::milliseconds(ms as i64);
            let expected = multiplier_at(Duration::from_millis(ms));
            assert_eq!(view.render_at(now), expected);
        }
    }

    #[test]
    fn test_flying_clamps_at_crash_point() {
        let start = Utc::now();
        let mut view = RoundView::new(snapshot(Phase::Flying, start));
        // Way past the crash threshold, before any crash snapshot arrives
        let value = view.render_at(start + TimeDelta::seconds(120));
        assert_eq!(value, Multiplier::from_hundredths(250));
    }

    #[test]
    fn test_small_divergence_does_not_snap() {
        let start = Utc::now();
        let mut view = RoundView::new(snapshot(Phase::Flying, start));
        let now = start + TimeDelta::seconds(5);
        let local = view.render_at(now);

        // Server reports a slightly different value (within tolerance)
        let mut server = snapshot(Phase::Flying, start);
        server.multiplier = Multiplier::from_hundredths(local.hundredths() + SNAP_TOLERANCE);
        view.apply_snapshot(server, now);

        // Displayed value keeps following the local curve, this frame and
        // the next
        assert_eq!(view.displayed(), local);
        assert_eq!(view.render_at(now), local);
    }

    #[test]
    fn test_large_divergence_snaps_to_server() {
        let start = Utc::now();
        let mut view = RoundView::new(snapshot(Phase::Flying, start));
        let now = start + TimeDelta::seconds(5);
        let local = view.render_at(now);

        // Server timeline drifted well beyond tolerance
        let mut server = snapshot(Phase::Flying, start);
        server.multiplier = Multiplier::from_hundredths(local.hundredths() + SNAP_TOLERANCE + 60);
        view.apply_snapshot(server, now);

        assert_eq!(view.displayed(), server.multiplier);
    }

    #[test]
    fn test_snap_persists_across_frames() {
        let start = Utc::now();
        let mut view = RoundView::new(snapshot(Phase::Flying, start));
        let now = start + TimeDelta::seconds(5);
        let local = view.render_at(now);

        let mut server = snapshot(Phase::Flying, start);
        server.multiplier = Multiplier::from_hundredths(local.hundredths() + SNAP_TOLERANCE + 60);
        view.apply_snapshot(server, now);

        // Rendering again does not fall back onto the old local curve: the
        // view stays on the server's timeline and keeps climbing from there
        assert_eq!(view.render_at(now), server.multiplier);
        let later = view.render_at(now + TimeDelta::seconds(1));
        assert!(later > server.multiplier);
        assert!(later <= server.crash_point);

        // A phase change discards the correction along with the old round
        let mut crashed = snapshot(Phase::Crashed, now);
        crashed.multiplier = crashed.crash_point;
        view.apply_snapshot(crashed, now);
        assert_eq!(view.displayed(), crashed.crash_point);
    }

    #[test]
    fn test_phase_change_resyncs_immediately() {
        let start = Utc::now();
        let mut view = RoundView::new(snapshot(Phase::Flying, start));
        let now = start + TimeDelta::seconds(5);
        view.render_at(now);

        let mut crashed = snapshot(Phase::Crashed, now);
        crashed.multiplier = crashed.crash_point;
        view.apply_snapshot(crashed, now);

        assert_eq!(view.phase(), Phase::Crashed);
        assert_eq!(view.displayed(), Multiplier::from_hundredths(250));
    }

    #[test]
    fn test_new_round_resets_view() {
        let start = Utc::now();
        let mut view = RoundView::new(snapshot(Phase::Crashed, start));

        let next = RoundSnapshot {
            round_id: 8,
            phase: Phase::Waiting,
            multiplier: Multiplier::ONE,
            crash_point: Multiplier::from_hundredths(410),
            phase_start_at: start + TimeDelta::seconds(3),
        };
        view.apply_snapshot(next, start + TimeDelta::seconds(3));

        assert_eq!(view.round_id(), 8);
        assert_eq!(view.displayed(), Multiplier::ONE);
    }
}
