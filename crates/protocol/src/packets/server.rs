//! Server -> Client message building.

use crate::{PlayerState, ProtocolError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consistent view of every player at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Wall-clock sample time (RFC 3339 on the wire).
    pub time: DateTime<Utc>,
    /// Unordered public player state.
    pub players: Vec<PlayerState>,
}

impl WorldSnapshot {
    pub fn new(tick: u64, time: DateTime<Utc>, players: Vec<PlayerState>) -> Self {
        Self { tick, time, players }
    }

    /// Serialize to the JSON text broadcast to clients.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Parse a broadcast back into a snapshot (used by clients and tests).
    pub fn from_json(payload: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(payload).map_err(ProtocolError::Decode)
    }
}
