//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Payload does not match the update schema: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode world snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Invalid animation state: {0}")]
    InvalidAnimation(u8),
}
