//! Networking layer (non-deterministic).
//!
//! WebSocket fanout server and wire message types. Everything async and
//! time-dependent lives here; the round state machine itself stays in `game/`.

pub mod protocol;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage};
pub use server::{BroadcastHooks, WsServer};
