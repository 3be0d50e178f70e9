//! Prometheus-compatible metrics endpoint
//!
//! Exposes projectile engine metrics in Prometheus format for Grafana dashboards.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Samples kept for tick time percentiles
const TICK_HISTORY_LEN: usize = 1000;

/// Metrics registry for the projectile engine
#[derive(Debug)]
pub struct Metrics {
    // Pool
    pub live_projectiles: AtomicU64,
    pub pool_capacity: AtomicU64,

    // Lifecycle totals
    pub projectiles_spawned: AtomicU64,
    pub projectiles_terminated: AtomicU64,
    pub spawns_rejected: AtomicU64,
    pub entity_hits: AtomicU64,
    pub bounces: AtomicU64,
    pub explosions: AtomicU64,
    pub explosion_damage_events: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Replication
    pub replication_packets: AtomicU64,
    pub replication_entries: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub observers_connected: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation (VecDeque for O(1) pop_front)
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            live_projectiles: AtomicU64::new(0),
            pool_capacity: AtomicU64::new(0),
            projectiles_spawned: AtomicU64::new(0),
            projectiles_terminated: AtomicU64::new(0),
            spawns_rejected: AtomicU64::new(0),
            entity_hits: AtomicU64::new(0),
            bounces: AtomicU64::new(0),
            explosions: AtomicU64::new(0),
            explosion_damage_events: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            replication_packets: AtomicU64::new(0),
            replication_entries: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            observers_connected: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY_LEN)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Pool gauges, refreshed once per tick
    pub fn record_pool(&self, live: usize, capacity: usize) {
        self.live_projectiles.store(live as u64, Ordering::Relaxed);
        self.pool_capacity.store(capacity as u64, Ordering::Relaxed);
    }

    /// One replication packet with `entries` positions
    pub fn record_packet(&self, entries: usize) {
        self.replication_packets.fetch_add(1, Ordering::Relaxed);
        self.replication_entries.fetch_add(entries as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Pool
        metric!("volley_projectiles_live", "Number of live projectiles", "gauge",
            self.live_projectiles.load(Ordering::Relaxed));
        metric!("volley_pool_capacity", "Projectile pool slots, live or free", "gauge",
            self.pool_capacity.load(Ordering::Relaxed));

        // Lifecycle
        metric!("volley_projectiles_spawned_total", "Projectiles spawned", "counter",
            self.projectiles_spawned.load(Ordering::Relaxed));
        metric!("volley_projectiles_terminated_total", "Projectiles terminated", "counter",
            self.projectiles_terminated.load(Ordering::Relaxed));
        metric!("volley_spawns_rejected_total", "Spawn requests rejected", "counter",
            self.spawns_rejected.load(Ordering::Relaxed));
        metric!("volley_entity_hits_total", "Direct hits on entities", "counter",
            self.entity_hits.load(Ordering::Relaxed));
        metric!("volley_bounces_total", "Projectile bounces", "counter",
            self.bounces.load(Ordering::Relaxed));
        metric!("volley_explosions_total", "Explosions triggered", "counter",
            self.explosions.load(Ordering::Relaxed));
        metric!("volley_explosion_damage_events_total", "Entities damaged by explosions", "counter",
            self.explosion_damage_events.load(Ordering::Relaxed));

        // Tick timing
        metric!("volley_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("volley_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("volley_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("volley_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("volley_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        // Replication
        metric!("volley_replication_packets_total", "Position batches sent", "counter",
            self.replication_packets.load(Ordering::Relaxed));
        metric!("volley_replication_entries_total", "Positions replicated", "counter",
            self.replication_entries.load(Ordering::Relaxed));
        metric!("volley_bytes_sent_total", "Encoded bytes fanned out to observers", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("volley_messages_dropped_total", "Outbound messages dropped", "counter",
            self.messages_dropped.load(Ordering::Relaxed));
        metric!("volley_observers_connected", "Connected observers", "gauge",
            self.observers_connected.load(Ordering::Relaxed));
        metric!("volley_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics (alternative for direct API access)
    pub fn to_json(&self) -> String {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        serde_json::json!({
            "pool": {
                "live": load(&self.live_projectiles),
                "capacity": load(&self.pool_capacity),
            },
            "lifecycle": {
                "spawned": load(&self.projectiles_spawned),
                "terminated": load(&self.projectiles_terminated),
                "rejected": load(&self.spawns_rejected),
                "entity_hits": load(&self.entity_hits),
                "bounces": load(&self.bounces),
                "explosions": load(&self.explosions),
                "explosion_damage_events": load(&self.explosion_damage_events),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_p99_us": load(&self.tick_time_p99_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "tick_count": load(&self.tick_count),
            },
            "replication": {
                "packets": load(&self.replication_packets),
                "entries": load(&self.replication_entries),
                "bytes_sent": load(&self.bytes_sent),
                "dropped": load(&self.messages_dropped),
                "observers": load(&self.observers_connected),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    // JSON route first: it shares the /metrics prefix
                    let response = if request.starts_with("GET /metrics/json") {
                        http_response("application/json", &metrics.to_json())
                    } else if request.starts_with("GET /metrics") {
                        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if request.starts_with("GET /health") {
                        http_response("text/plain", "OK")
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.live_projectiles.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();
        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) >= 1000);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_pool(12, 125);
        Metrics::incr(&metrics.explosions);

        let output = metrics.to_prometheus();
        assert!(output.contains("volley_projectiles_live 12"));
        assert!(output.contains("volley_pool_capacity 125"));
        assert!(output.contains("volley_explosions_total 1"));
        assert!(output.contains("# TYPE volley_bounces_total counter"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.record_packet(64);
        metrics.record_packet(2);

        let json: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(json["replication"]["packets"], 2);
        assert_eq!(json["replication"]["entries"], 66);
    }
}
