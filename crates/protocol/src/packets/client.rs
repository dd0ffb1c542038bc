//! Client -> Server message parsing.

use crate::{AnimationState, Position, ProtocolError, Rotation};
use serde::{Deserialize, Serialize};

/// State update sent by a client for its own player.
///
/// Carries no identifier: the connection it arrives on names the target entry.
/// Absent fields decode as zero values (origin, `Idle`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientUpdate {
    pub position: Position,
    pub rotation: Rotation,
    pub animation: AnimationState,
}

impl ClientUpdate {
    /// Parse an update from a JSON object. Missing fields default and a bare
    /// `null` is an empty update; an out-of-range animation is an error.
    pub fn from_json(payload: &str) -> Result<Self, ProtocolError> {
        let update: Option<Self> = serde_json::from_str(payload).map_err(ProtocolError::Decode)?;
        Ok(update.unwrap_or_default())
    }
}

/// Parsed inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    /// Payload matched the update schema.
    Update(ClientUpdate),
    /// Anything else, kept verbatim for the echo reply.
    Text(String),
}

impl ClientPacket {
    /// Run the decode chain: structured update first, then free text.
    ///
    /// Never fails; a schema mismatch degrades to [`ClientPacket::Text`].
    pub fn parse(payload: &str) -> Self {
        match ClientUpdate::from_json(payload) {
            Ok(update) => ClientPacket::Update(update),
            Err(_) => ClientPacket::Text(payload.to_owned()),
        }
    }
}

/// Build the reply sent for a payload that was not an update.
pub fn build_echo(session_id: &str, text: &str) -> String {
    format!("Echo from {session_id}: {text}")
}
