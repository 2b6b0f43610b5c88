//! # Crash Rocket Server
//!
//! Authoritative round scheduler for a multiplier crash game.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   CRASH ROCKET SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── multiplier.rs - Hundredths-precision multiplier math    │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── clock.rs    - Phase-clock elapsed/remaining helpers     │
//! │                                                              │
//! │  game/           - Round logic (sync, store-agnostic)        │
//! │  ├── round.rs    - Round entity and phase lifecycle          │
//! │  ├── crash_point.rs - Crash-point generation                 │
//! │  ├── store.rs    - CAS-guarded round store                   │
//! │  ├── scheduler.rs- Idempotent start/tick/next transitions    │
//! │  └── driver.rs   - Resumable async phase driver              │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket fanout server                   │
//! │  └── protocol.rs - Message types                             │
//! │                                                              │
//! │  client.rs       - Client-side round view sync               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Idempotency Guarantee
//!
//! Every phase transition in `game/` is a compare-and-swap against the
//! persisted round, guarded by the phase clock:
//! - Any number of drivers may call `start`/`tick`/`next` concurrently
//! - Exactly one caller wins each transition; losers converge on the
//!   winner's state
//! - All timing derives from persisted `phase_start_at`, so a restarted
//!   process resumes mid-phase instead of replaying it
//!
//! Given the same boot entropy, the crash-point sequence is
//! **identical** across runs, which keeps rounds replayable.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::multiplier::{multiplier_at, Multiplier, GROWTH_RATE};
pub use crate::core::rng::XorshiftRng;
pub use client::RoundView;
pub use config::{GameConfig, ServerConfig};
pub use game::driver::Driver;
pub use game::round::{Phase, Round, RoundSnapshot};
pub use game::scheduler::{AdvanceAction, RoundHooks, Scheduler};
pub use game::store::{MemoryRoundStore, RoundStore, StoreError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
