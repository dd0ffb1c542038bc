//! Shared protocol crate for worldcast.
//!
//! This crate contains:
//! - The JSON message definitions (inbound updates, outbound snapshots)
//! - The ordered decode chain for inbound payloads
//! - Shared types (Vec3, AnimationState, PlayerState)

mod error;
pub mod packets;

pub use error::ProtocolError;
pub use packets::{ClientPacket, ClientUpdate, WorldSnapshot};

use serde::{Deserialize, Serialize};

/// A three-component vector as it appears on the wire (`{"x":..,"y":..,"z":..}`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// World coordinates.
pub type Position = Vec3;

/// Euler rotation in radians.
pub type Rotation = Vec3;

/// Movement pose of a player. Encoded as an integer in `0..=3`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AnimationState {
    #[default]
    Idle = 0,
    Walking = 1,
    Running = 2,
    Jumping = 3,
}

impl TryFrom<u8> for AnimationState {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Idle),
            1 => Ok(Self::Walking),
            2 => Ok(Self::Running),
            3 => Ok(Self::Jumping),
            other => Err(ProtocolError::InvalidAnimation(other)),
        }
    }
}

impl From<AnimationState> for u8 {
    fn from(state: AnimationState) -> Self {
        state as u8
    }
}

/// Public per-player state included in every world snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: String,
    pub name: String,
    pub position: Position,
    pub rotation: Rotation,
    pub animation: AnimationState,
}
