//! Fixed-rate tick loop.

use super::broadcast::{BroadcastReport, broadcast};
use crate::registry::PlayerRegistry;
use crate::stats::ProcessStats;
use chrono::Utc;
use protocol::WorldSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info, warn};

/// Every this many ticks a diagnostics report is logged.
pub const STATS_EVERY: u64 = 100;

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number (1 for the first tick).
    pub tick: u64,
    /// Players in this tick's snapshot.
    pub players: usize,
    /// Fan-out result, or `None` when encoding failed and the broadcast was skipped.
    pub broadcast: Option<BroadcastReport>,
}

/// Samples the registry at a fixed rate and broadcasts each snapshot.
pub struct TickScheduler {
    registry: Arc<PlayerRegistry>,
    interval: Duration,
    tick: u64,
}

impl TickScheduler {
    pub fn new(registry: Arc<PlayerRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            tick: 0,
        }
    }

    /// Number of ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Run one tick: count, sample, encode, fan out.
    pub async fn tick_once(&mut self) -> TickReport {
        self.tick += 1;

        let players = self.registry.snapshot().await;
        let player_count = players.len();
        let world = WorldSnapshot::new(self.tick, Utc::now(), players);

        let broadcast_report = match world.to_json() {
            Ok(json) => Some(broadcast(&self.registry, json.into()).await),
            Err(e) => {
                error!("Failed to encode world state for tick {}: {}", self.tick, e);
                None
            }
        };

        if self.tick % STATS_EVERY == 0 {
            info!(
                "Game tick {} - Broadcasting to {} players",
                self.tick, player_count
            );
            let tick = self.tick;
            // Sampling reads procfs; keep it off the tick path.
            tokio::task::spawn_blocking(move || ProcessStats::sample().log(tick));
        }

        TickReport {
            tick: self.tick,
            players: player_count,
            broadcast: broadcast_report,
        }
    }

    /// Tick forever at the configured interval.
    ///
    /// The first tick fires one interval after start. When a tick overruns,
    /// the fires it missed are dropped: the next tick waits for the next
    /// interval boundary instead of bursting to catch up. Never returns;
    /// abort the task to stop it.
    pub async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let scheduled = ticker.tick().await;

            let started = Instant::now();
            self.tick_once().await;
            let elapsed = started.elapsed();

            if elapsed > self.interval {
                warn!(
                    "Slow tick #{}: {:.3}ms (budget: {:.1}ms, lag: {:?})",
                    self.tick,
                    elapsed.as_secs_f64() * 1000.0,
                    self.interval.as_secs_f64() * 1000.0,
                    Instant::now().saturating_duration_since(scheduled)
                );
            }
        }
    }
}
