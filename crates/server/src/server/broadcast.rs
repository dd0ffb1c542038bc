//! Snapshot fan-out to every live connection.

use crate::registry::PlayerRegistry;
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tracing::warn;

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Queue `payload` on every live connection.
///
/// Walks the registry's live entries rather than a snapshot, since only live
/// entries own a connection handle. A failed push is logged and skipped; the
/// entry stays registered until its own handler notices the disconnect.
pub async fn broadcast(registry: &PlayerRegistry, payload: Utf8Bytes) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    registry
        .for_each_live(|id, handle| match handle.send_text(payload.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!("Failed to send to player {}: {}", id, e);
                report.failed += 1;
            }
        })
        .await;

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConnectionHandle, Player};
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test]
    async fn test_broadcast_reaches_every_player() {
        let registry = PlayerRegistry::new();
        let (a, mut a_rx) = ConnectionHandle::channel();
        let (b, mut b_rx) = ConnectionHandle::channel();
        registry.add(Player::new("a", a)).await;
        registry.add(Player::new("b", b)).await;

        let report = broadcast(&registry, "world".into()).await;

        assert_eq!(report, BroadcastReport { delivered: 2, failed: 0 });
        assert_eq!(a_rx.recv().await, Some(Message::Text("world".into())));
        assert_eq!(b_rx.recv().await, Some(Message::Text("world".into())));
    }

    #[tokio::test]
    async fn test_failed_send_does_not_stop_delivery() {
        let registry = PlayerRegistry::new();
        let (dead, dead_rx) = ConnectionHandle::channel();
        let (live, mut live_rx) = ConnectionHandle::channel();
        registry.add(Player::new("dead", dead)).await;
        registry.add(Player::new("live", live)).await;

        // Writer task of "dead" is gone.
        drop(dead_rx);

        let report = broadcast(&registry, "tick-1".into()).await;
        assert_eq!(report, BroadcastReport { delivered: 1, failed: 1 });
        assert_eq!(live_rx.recv().await, Some(Message::Text("tick-1".into())));

        // Fan-out never removes the failed entry; repeated failures are harmless.
        assert_eq!(registry.count().await, 2);
        let report = broadcast(&registry, "tick-2".into()).await;
        assert_eq!(report.failed, 1);
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn test_broadcast_with_no_players() {
        let registry = PlayerRegistry::new();
        let report = broadcast(&registry, "empty".into()).await;
        assert_eq!(report, BroadcastReport::default());
    }
}
