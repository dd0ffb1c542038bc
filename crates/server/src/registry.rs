//! Concurrent player registry.
//!
//! Maps a session id to the live state of the player owned by that
//! connection. One reader-writer lock guards the whole map: `add`, `remove`
//! and `update_state` take it exclusively, `snapshot`, `count` and
//! `for_each_live` share it. Entries carry no locks of their own because only
//! the owning connection handler ever mutates its entry.

use protocol::{AnimationState, ClientUpdate, PlayerState, Position, Rotation, Vec3};
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tracing::{debug, info, warn};

/// The connection's writer task has gone away.
#[derive(Debug, Error)]
#[error("Connection closed")]
pub struct ConnectionClosed;

/// Outbound queue of one connection.
///
/// Pushing never blocks; the socket write happens in the connection's writer
/// task, so the handle can be used while the registry lock is held.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end drained by the writer task.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a text frame.
    pub fn send_text(&self, text: impl Into<Utf8Bytes>) -> Result<(), ConnectionClosed> {
        self.tx
            .send(Message::Text(text.into()))
            .map_err(|_| ConnectionClosed)
    }

    /// Queue a close frame.
    pub fn close(&self) -> Result<(), ConnectionClosed> {
        self.tx.send(Message::Close(None)).map_err(|_| ConnectionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A registry entry.
#[derive(Debug)]
pub struct Player {
    /// Session id (registry key).
    pub id: String,
    /// Display name.
    pub name: String,
    pub position: Position,
    pub rotation: Rotation,
    pub animation: AnimationState,
    /// When the connection was established.
    pub connected_at: Instant,
    /// When the last update was applied.
    pub last_update: Instant,
    /// Outbound queue of the owning connection. Never serialized.
    handle: ConnectionHandle,
}

impl Player {
    /// A freshly connected player at the origin, idle.
    pub fn new(id: impl Into<String>, handle: ConnectionHandle) -> Self {
        let id = id.into();
        let now = Instant::now();
        Self {
            name: format!("Player-{id}"),
            id,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            animation: AnimationState::Idle,
            connected_at: now,
            last_update: now,
            handle,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Copy of the fields clients are allowed to see.
    pub fn public_state(&self) -> PlayerState {
        PlayerState {
            id: self.id.clone(),
            name: self.name.clone(),
            position: self.position,
            rotation: self.rotation,
            animation: self.animation,
        }
    }

    fn apply(&mut self, update: &ClientUpdate) {
        self.position = update.position;
        self.rotation = update.rotation;
        self.animation = update.animation;
        self.last_update = Instant::now();
    }
}

/// Session id -> player store shared by the tick scheduler and every
/// connection handler.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: RwLock<HashMap<String, Player>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a player keyed by its id.
    ///
    /// An existing entry with the same id is replaced and dropped together
    /// with its connection handle; the replaced connection is not closed and
    /// its handler keeps running until its own read loop ends.
    pub async fn add(&self, player: Player) {
        let mut players = self.players.write().await;
        let id = player.id.clone();
        if let Some(previous) = players.insert(id.clone(), player) {
            warn!(
                "Player {} replaced an active entry (connected {:?} ago)",
                id,
                previous.connected_at.elapsed()
            );
        }
        info!("Player {} connected. Total players: {}", id, players.len());
    }

    /// Remove the entry for `id`. Absent ids are a no-op.
    ///
    /// Returns whether an entry was removed.
    pub async fn remove(&self, id: &str) -> bool {
        let mut players = self.players.write().await;
        let removed = players.remove(id).is_some();
        if removed {
            info!("Player {} disconnected. Total players: {}", id, players.len());
        }
        removed
    }

    /// Apply an update to the entry for `id` if it is still present.
    ///
    /// An update racing with a disconnect is silently dropped. Returns
    /// whether the update was applied.
    pub async fn update_state(&self, id: &str, update: &ClientUpdate) -> bool {
        let mut players = self.players.write().await;
        match players.get_mut(id) {
            Some(player) => {
                player.apply(update);
                true
            }
            None => {
                debug!("Dropped update for absent player {}", id);
                false
            }
        }
    }

    /// Detached copy of every player's public state.
    ///
    /// Taken under a single read lock, so the result is internally consistent
    /// and unaffected by later writes.
    pub async fn snapshot(&self) -> Vec<PlayerState> {
        let players = self.players.read().await;
        players.values().map(Player::public_state).collect()
    }

    pub async fn count(&self) -> usize {
        self.players.read().await.len()
    }

    /// Visit the connection handle of every live entry under the read lock.
    ///
    /// `f` must not block; queue pushes on [`ConnectionHandle`] never do.
    pub async fn for_each_live<F>(&self, mut f: F)
    where
        F: FnMut(&str, &ConnectionHandle),
    {
        let players = self.players.read().await;
        for (id, player) in players.iter() {
            f(id, &player.handle);
        }
    }

    /// Hold the write lock for `duration`, stalling every other caller.
    #[cfg(test)]
    pub(crate) async fn hold_exclusive(&self, duration: std::time::Duration) {
        let _players = self.players.write().await;
        tokio::time::sleep(duration).await;
    }
}
