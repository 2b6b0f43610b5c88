//! Round Driver
//!
//! The timer loop that pushes the scheduler through its phases. Drivers
//! hold no round state of their own: every sleep is computed from the
//! stored `phase_start_at` via the round clock, so a driver can be killed
//! and restarted freely (or run redundantly next to others) and the round
//! resumes exactly where the store says it is.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::GameConfig;
use crate::core::clock;
use crate::game::round::{Phase, RoundSnapshot};
use crate::game::scheduler::{RoundHooks, Scheduler};
use crate::game::store::{RoundStore, StoreError};

/// Pause before retrying after a transient store failure.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// The driver loop.
pub struct Driver<S: RoundStore, H: RoundHooks> {
    scheduler: Arc<Scheduler<S, H>>,
    config: GameConfig,
    updates: broadcast::Sender<RoundSnapshot>,
    shutdown: broadcast::Receiver<()>,
}

impl<S: RoundStore, H: RoundHooks> Driver<S, H> {
    /// Create a driver. Snapshots produced by each advance call are
    /// published on `updates` for the network layer to fan out.
    pub fn new(
        scheduler: Arc<Scheduler<S, H>>,
        config: GameConfig,
        updates: broadcast::Sender<RoundSnapshot>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            scheduler,
            config,
            updates,
            shutdown,
        }
    }

    /// Run until shutdown. Transient store failures are logged and retried
    /// with backoff; the loop itself never errors out.
    pub async fn run(self) {
        let Driver {
            scheduler,
            config,
            updates,
            mut shutdown,
        } = self;

        info!("driver loop running");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("driver shutting down");
                    break;
                }
                result = Self::step(&scheduler, &config, &updates) => {
                    if let Err(e) = result {
                        warn!(error = %e, "store unreachable; backing off");
                        sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }
    }

    /// One pass: sleep out the remainder of the current phase, then make
    /// the appropriate advance call and publish the result.
    async fn step(
        scheduler: &Scheduler<S, H>,
        config: &GameConfig,
        updates: &broadcast::Sender<RoundSnapshot>,
    ) -> Result<(), StoreError> {
        let snap = scheduler.current()?;

        let next = match snap.phase {
            Phase::Waiting => {
                sleep(clock::remaining(snap.phase_start_at, config.waiting_duration)).await;
                scheduler.start()?
            }
            Phase::Flying => {
                sleep(config.tick_interval).await;
                scheduler.tick()?
            }
            Phase::Crashed => {
                sleep(clock::remaining(snap.phase_start_at, config.crashed_duration)).await;
                scheduler.next()?
            }
        };

        // Nobody listening is fine; fanout is best-effort
        let _ = updates.send(next);
        Ok(())
    }
}
