//! Prometheus-compatible metrics endpoint
//!
//! Exposes match server metrics in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Rolling window used for tick-time percentiles
const TICK_HISTORY: usize = 1000;

/// Metrics registry for the match server
#[derive(Debug)]
pub struct Metrics {
    // Tick timing (microseconds, whole frame across all matches)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // World population, refreshed every frame
    pub active_matches: AtomicU64,
    pub living_players: AtomicU64,
    pub living_enemies: AtomicU64,
    pub active_enemies: AtomicU64,

    // Counters
    pub messages_published: AtomicU64,
    pub matches_ended: AtomicU64,
    pub waves_spawned: AtomicU64,

    start_time: Instant,

    tick_history: RwLock<VecDeque<u64>>,
}

/// Population totals gathered during one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Population {
    pub matches: u64,
    pub living_players: u64,
    pub living_enemies: u64,
    pub active_enemies: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            active_matches: AtomicU64::new(0),
            living_players: AtomicU64::new(0),
            living_enemies: AtomicU64::new(0),
            active_enemies: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            matches_ended: AtomicU64::new(0),
            waves_spawned: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    /// Record a frame time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
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

    pub fn record_population(&self, population: Population) {
        self.active_matches.store(population.matches, Ordering::Relaxed);
        self.living_players.store(population.living_players, Ordering::Relaxed);
        self.living_enemies.store(population.living_enemies, Ordering::Relaxed);
        self.active_enemies.store(population.active_enemies, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("survivor_matches_active", "Number of running matches", "gauge",
            self.active_matches.load(Ordering::Relaxed));
        metric!("survivor_players_alive", "Living players across all matches", "gauge",
            self.living_players.load(Ordering::Relaxed));
        metric!("survivor_enemies_alive", "Living enemies across all matches", "gauge",
            self.living_enemies.load(Ordering::Relaxed));
        metric!("survivor_enemies_active", "Enemies awake near a player", "gauge",
            self.active_enemies.load(Ordering::Relaxed));

        metric!("survivor_tick_time_microseconds", "Last frame time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("survivor_tick_time_p95_microseconds", "95th percentile frame time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("survivor_tick_time_p99_microseconds", "99th percentile frame time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("survivor_tick_time_max_microseconds", "Maximum frame time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("survivor_tick_count", "Total frames processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        metric!("survivor_messages_published_total", "Events handed to the message sink", "counter",
            self.messages_published.load(Ordering::Relaxed));
        metric!("survivor_matches_ended_total", "Matches that ended in play", "counter",
            self.matches_ended.load(Ordering::Relaxed));
        metric!("survivor_waves_spawned_total", "Waves spawned after a clear", "counter",
            self.waves_spawned.load(Ordering::Relaxed));
        metric!("survivor_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        format!(r#"{{
  "world": {{
    "matches": {},
    "players_alive": {},
    "enemies_alive": {},
    "enemies_active": {}
  }},
  "performance": {{
    "tick_time_us": {},
    "tick_time_p95_us": {},
    "tick_time_p99_us": {},
    "tick_time_max_us": {},
    "tick_count": {}
  }},
  "totals": {{
    "messages_published": {},
    "matches_ended": {},
    "waves_spawned": {},
    "uptime_seconds": {}
  }}
}}"#,
            self.active_matches.load(Ordering::Relaxed),
            self.living_players.load(Ordering::Relaxed),
            self.living_enemies.load(Ordering::Relaxed),
            self.active_enemies.load(Ordering::Relaxed),
            self.tick_time_us.load(Ordering::Relaxed),
            self.tick_time_p95_us.load(Ordering::Relaxed),
            self.tick_time_p99_us.load(Ordering::Relaxed),
            self.tick_time_max_us.load(Ordering::Relaxed),
            self.tick_count.load(Ordering::Relaxed),
            self.messages_published.load(Ordering::Relaxed),
            self.matches_ended.load(Ordering::Relaxed),
            self.waves_spawned.load(Ordering::Relaxed),
            self.uptime_seconds(),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(request: &str, metrics: &Metrics) -> String {
    let (content_type, body) = if request.starts_with("GET /metrics/json") {
        ("application/json", metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        ("text/plain; version=0.0.4", metrics.to_prometheus())
    } else if request.starts_with("GET /health") {
        ("text/plain", "OK".to_string())
    } else {
        return "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
    };
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = http_response(&request, &metrics);
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
