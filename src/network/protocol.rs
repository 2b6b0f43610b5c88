//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON for debugging ease,
//! with optional binary (bincode) for production.

use serde::{Deserialize, Serialize};

use crate::game::round::RoundSnapshot;
use crate::game::scheduler::AdvanceAction;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request the current round snapshot.
    CurrentRound,

    /// Driver request to advance the round state machine.
    Advance(AdvanceRequest),

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

impl ClientMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Advance request from an external driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceRequest {
    /// Which transition to attempt.
    pub action: AdvanceAction,
    /// Shared secret identifying the caller as a driver. Authorization of
    /// the secret itself is an operational concern, not the scheduler's.
    pub secret: String,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Periodic round snapshot (every driver tick while flying).
    Round(RoundSnapshot),

    /// A new round opened for betting; its crash point is already fixed.
    RoundOpen(RoundSnapshot),

    /// The round crashed at its terminal multiplier.
    RoundCrashed(RoundSnapshot),

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(WireError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Compact binary form of a snapshot, for bandwidth-sensitive feeds.
///
/// Only the snapshot itself has a binary form; the tagged message envelope
/// stays JSON (internally tagged enums are not representable in bincode).
pub fn snapshot_to_bytes(snapshot: &RoundSnapshot) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(snapshot)
}

/// Decode a snapshot from its binary form.
pub fn snapshot_from_bytes(data: &[u8]) -> Result<RoundSnapshot, bincode::Error> {
    bincode::deserialize(data)
}

/// Error payload sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed.
    InvalidInput,
    /// Advance secret missing or wrong.
    Unauthorized,
    /// Backing store temporarily unreachable; retry.
    StoreUnavailable,
    /// Unexpected server-side failure.
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::multiplier::Multiplier;
    use crate::game::round::Phase;
    use chrono::Utc;

    fn sample_snapshot() -> RoundSnapshot {
        RoundSnapshot {
            round_id: 12,
            phase: Phase::Flying,
            multiplier: Multiplier::from_hundredths(202),
            crash_point: Multiplier::from_hundredths(250),
            phase_start_at: Utc::now(),
        }
    }

    #[test]
    fn test_client_message_json_tags() {
        let json = ClientMessage::CurrentRound.to_json().unwrap();
        assert!(json.contains("\"type\":\"current_round\""));

        let advance = ClientMessage::Advance(AdvanceRequest {
            action: AdvanceAction::Tick,
            secret: "s3cret".into(),
        });
        let json = advance.to_json().unwrap();
        assert!(json.contains("\"type\":\"advance\""));
        assert!(json.contains("\"action\":\"tick\""));

        let parsed = ClientMessage::from_json(&json).unwrap();
        match parsed {
            ClientMessage::Advance(req) => assert_eq!(req.action, AdvanceAction::Tick),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_wire_fields() {
        let msg = ServerMessage::Round(sample_snapshot());
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"round_id\":12"));
        assert!(json.contains("\"phase\":\"flying\""));
        assert!(json.contains("\"multiplier\":2.02"));
        assert!(json.contains("\"crash_point\":2.5"));
        assert!(json.contains("phase_start_at"));
    }

    #[test]
    fn test_snapshot_binary_roundtrip() {
        let snap = sample_snapshot();
        let bytes = snapshot_to_bytes(&snap).unwrap();
        let back = snapshot_from_bytes(&bytes).unwrap();
        assert_eq!(back.round_id, snap.round_id);
        assert_eq!(back.phase, snap.phase);
        assert_eq!(back.multiplier, snap.multiplier);
        assert_eq!(back.crash_point, snap.crash_point);
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(ClientMessage::from_json("{\"type\":\"launch_missiles\"}").is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }
}
