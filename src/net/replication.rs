//! Replication scheduler
//!
//! Background task on the authority that keeps observers' projectile
//! positions roughly in sync with a bounded packet budget:
//!
//! - no live projectiles: poll again after a short idle wait, send nothing
//! - up to one batch worth: one packet with everything, then the short interval
//! - more than that: one packet per chunk, each followed by the long interval
//!
//! Under load this trades per-projectile latency for a fixed packet size and
//! rate. The scheduler only reads the pool; it never mutates records.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::game::constants::replication::{
    BATCH_SIZE, IDLE_POLL_MS, LONG_INTERVAL_MS, SHORT_INTERVAL_MS,
};
use crate::game::pool::SharedPool;
use crate::game::projectile::{ProjectileHandle, WireId};
use crate::metrics::Metrics;
use crate::net::outbound::OutboundSender;
use crate::net::protocol::ReplicationMessage;

/// Pacing for the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationConfig {
    /// Positions per packet (at most [`BATCH_SIZE`])
    pub batch_size: usize,
    pub short_interval: Duration,
    pub long_interval: Duration,
    pub idle_poll: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            short_interval: Duration::from_millis(SHORT_INTERVAL_MS),
            long_interval: Duration::from_millis(LONG_INTERVAL_MS),
            idle_poll: Duration::from_millis(IDLE_POLL_MS),
        }
    }
}

/// What one scheduling round will send
#[derive(Debug, Clone, PartialEq)]
pub enum RoundPlan {
    Idle,
    /// Everything in one packet
    Single(Vec<ProjectileHandle>),
    /// One packet per chunk
    Chunked(Vec<Vec<ProjectileHandle>>),
}

impl RoundPlan {
    pub fn packet_count(&self) -> usize {
        match self {
            Self::Idle => 0,
            Self::Single(_) => 1,
            Self::Chunked(chunks) => chunks.len(),
        }
    }
}

pub struct ReplicationScheduler {
    pool: SharedPool,
    sender: OutboundSender,
    config: ReplicationConfig,
    metrics: Option<Arc<Metrics>>,
}

impl ReplicationScheduler {
    pub fn new(pool: SharedPool, sender: OutboundSender, config: ReplicationConfig) -> Self {
        let config = ReplicationConfig {
            batch_size: config.batch_size.clamp(1, BATCH_SIZE),
            ..config
        };
        Self {
            pool,
            sender,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Snapshot the live set and split it for this round
    pub fn plan(&self) -> RoundPlan {
        let live = self.pool.read().live_handles();
        if live.is_empty() {
            RoundPlan::Idle
        } else if live.len() <= self.config.batch_size {
            RoundPlan::Single(live)
        } else {
            RoundPlan::Chunked(
                live.chunks(self.config.batch_size)
                    .map(<[ProjectileHandle]>::to_vec)
                    .collect(),
            )
        }
    }

    /// Run one scheduling round, including its pacing waits.
    /// Returns the number of packets sent.
    pub async fn run_round(&self) -> usize {
        match self.plan() {
            RoundPlan::Idle => {
                sleep(self.config.idle_poll).await;
                0
            }
            RoundPlan::Single(handles) => {
                let sent = usize::from(self.send_positions(&handles));
                sleep(self.config.short_interval).await;
                sent
            }
            RoundPlan::Chunked(chunks) => {
                let mut sent = 0;
                for chunk in &chunks {
                    sent += usize::from(self.send_positions(chunk));
                    sleep(self.config.long_interval).await;
                }
                debug!(
                    "Replicated {} live projectiles in {} chunks",
                    chunks.iter().map(Vec::len).sum::<usize>(),
                    sent
                );
                sent
            }
        }
    }

    /// Send current positions for the handles still live. Positions are read
    /// at send time, so a chunk sent late in a round is not stale.
    fn send_positions(&self, handles: &[ProjectileHandle]) -> bool {
        let pairs: Vec<(WireId, glam::Vec3)> = {
            let pool = self.pool.read();
            handles
                .iter()
                .filter_map(|&h| pool.get(h).map(|p| (h.index, p.position)))
                .collect()
        };
        if pairs.is_empty() {
            return false;
        }

        self.sender.send_or_warn(ReplicationMessage::position_batch(&pairs));
        if let Some(metrics) = &self.metrics {
            metrics.record_packet(pairs.len());
        }
        true
    }

    /// Run until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Replication scheduler started (batch {}, {:?}/{:?})",
            self.config.batch_size, self.config.short_interval, self.config.long_interval
        );
        loop {
            tokio::select! {
                _ = self.run_round() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Replication scheduler stopped");
    }
}
