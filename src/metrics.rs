//! Prometheus-compatible metrics endpoint
//!
//! Exposes simulation and session metrics in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::game::state::Species;
use crate::lobby::session::SessionPhase;

/// Metrics registry shared by every client in the process
#[derive(Debug)]
pub struct Metrics {
    // Frame timing (microseconds)
    pub frame_count: AtomicU64,
    pub frame_time_us: AtomicU64,
    pub frame_time_p95_us: AtomicU64,
    pub frame_time_p99_us: AtomicU64,
    pub frame_time_max_us: AtomicU64,

    // Entities
    pub active_birds: AtomicU64,
    pub pool_capacity: AtomicU64,
    pub pending_spawns: AtomicU64,
    pub birds_spawned: AtomicU64,
    pub birds_escaped: AtomicU64,
    pub birds_landed: AtomicU64,

    // Scoring
    pub hits_total: AtomicU64,
    pub points_total: AtomicU64,
    #[cfg(feature = "metrics_extended")]
    pub hits_by_species: [AtomicU64; 4],

    // Session (0=Lobby, 1=Countdown, 2=Active, 3=WaitingForPlayers, 4=Over)
    pub session_phase: AtomicU64,
    pub round_number: AtomicU64,
    pub seconds_remaining: AtomicU64,
    pub participants: AtomicU64,
    pub sessions_ended: AtomicU64,

    // Ledger
    pub notifications: AtomicU64,
    #[cfg(feature = "metrics_extended")]
    pub ledger_failures: AtomicU64,

    start_time: Instant,

    // Rolling frame times for percentile calculation
    frame_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frame_count: AtomicU64::new(0),
            frame_time_us: AtomicU64::new(0),
            frame_time_p95_us: AtomicU64::new(0),
            frame_time_p99_us: AtomicU64::new(0),
            frame_time_max_us: AtomicU64::new(0),
            active_birds: AtomicU64::new(0),
            pool_capacity: AtomicU64::new(0),
            pending_spawns: AtomicU64::new(0),
            birds_spawned: AtomicU64::new(0),
            birds_escaped: AtomicU64::new(0),
            birds_landed: AtomicU64::new(0),
            hits_total: AtomicU64::new(0),
            points_total: AtomicU64::new(0),
            #[cfg(feature = "metrics_extended")]
            hits_by_species: Default::default(),
            session_phase: AtomicU64::new(0),
            round_number: AtomicU64::new(1),
            seconds_remaining: AtomicU64::new(0),
            participants: AtomicU64::new(0),
            sessions_ended: AtomicU64::new(0),
            notifications: AtomicU64::new(0),
            #[cfg(feature = "metrics_extended")]
            ledger_failures: AtomicU64::new(0),
            start_time: Instant::now(),
            frame_history: RwLock::new(VecDeque::with_capacity(1000)),
        }
    }

    /// Record a frame time and update percentiles
    pub fn record_frame_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.frame_time_us.store(us, Ordering::Relaxed);
        self.frame_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.frame_history.write();
        history.push_back(us);
        while history.len() > 1000 {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.frame_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.frame_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.frame_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn record_hit(&self, species: Species, points: u32) {
        self.hits_total.fetch_add(1, Ordering::Relaxed);
        self.points_total.fetch_add(points as u64, Ordering::Relaxed);
        #[cfg(feature = "metrics_extended")]
        self.hits_by_species[species_index(species)].fetch_add(1, Ordering::Relaxed);
        #[cfg(not(feature = "metrics_extended"))]
        let _ = species;
    }

    pub fn record_notification(&self, is_error: bool) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics_extended")]
        if is_error {
            self.ledger_failures.fetch_add(1, Ordering::Relaxed);
        }
        #[cfg(not(feature = "metrics_extended"))]
        let _ = is_error;
    }

    pub fn set_phase(&self, phase: SessionPhase) {
        self.session_phase.store(phase_code(phase), Ordering::Relaxed);
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

        // Frame timing
        metric!("birdcatch_frame_count", "Total frames simulated", "counter",
            self.frame_count.load(Ordering::Relaxed));
        metric!("birdcatch_frame_time_microseconds", "Last frame time in microseconds", "gauge",
            self.frame_time_us.load(Ordering::Relaxed));
        metric!("birdcatch_frame_time_p95_microseconds", "95th percentile frame time", "gauge",
            self.frame_time_p95_us.load(Ordering::Relaxed));
        metric!("birdcatch_frame_time_p99_microseconds", "99th percentile frame time", "gauge",
            self.frame_time_p99_us.load(Ordering::Relaxed));
        metric!("birdcatch_frame_time_max_microseconds", "Maximum frame time", "gauge",
            self.frame_time_max_us.load(Ordering::Relaxed));

        // Entities
        metric!("birdcatch_birds_active", "Birds currently in the arena", "gauge",
            self.active_birds.load(Ordering::Relaxed));
        metric!("birdcatch_pool_capacity", "Bird records allocated by the pool", "gauge",
            self.pool_capacity.load(Ordering::Relaxed));
        metric!("birdcatch_spawns_pending", "Flock members waiting for their stagger", "gauge",
            self.pending_spawns.load(Ordering::Relaxed));
        metric!("birdcatch_birds_spawned_total", "Birds spawned", "counter",
            self.birds_spawned.load(Ordering::Relaxed));
        metric!("birdcatch_birds_escaped_total", "Birds that left the arena unhit", "counter",
            self.birds_escaped.load(Ordering::Relaxed));
        metric!("birdcatch_birds_landed_total", "Hit birds that finished falling", "counter",
            self.birds_landed.load(Ordering::Relaxed));

        // Scoring
        metric!("birdcatch_hits_total", "Scored hits", "counter",
            self.hits_total.load(Ordering::Relaxed));
        metric!("birdcatch_points_total", "Points awarded", "counter",
            self.points_total.load(Ordering::Relaxed));
        #[cfg(feature = "metrics_extended")]
        {
            output.push_str("# HELP birdcatch_species_hits_total Scored hits by species\n");
            output.push_str("# TYPE birdcatch_species_hits_total counter\n");
            for species in Species::ALL {
                output.push_str(&format!(
                    "birdcatch_species_hits_total{{species=\"{}\"}} {}\n",
                    species.name(),
                    self.hits_by_species[species_index(species)].load(Ordering::Relaxed)
                ));
            }
        }

        // Session
        metric!("birdcatch_session_phase", "Session phase (0=Lobby, 4=Over)", "gauge",
            self.session_phase.load(Ordering::Relaxed));
        output.push_str(&format!(
            "# HELP birdcatch_session_state Human-readable session phase\n# TYPE birdcatch_session_state gauge\nbirdcatch_session_state{{phase=\"{}\"}} 1\n",
            phase_name(self.session_phase.load(Ordering::Relaxed))
        ));
        metric!("birdcatch_round_number", "Current round number", "gauge",
            self.round_number.load(Ordering::Relaxed));
        metric!("birdcatch_seconds_remaining", "Round seconds remaining", "gauge",
            self.seconds_remaining.load(Ordering::Relaxed));
        metric!("birdcatch_participants", "Connected participants", "gauge",
            self.participants.load(Ordering::Relaxed));
        metric!("birdcatch_sessions_ended_total", "Clients that saw their session end", "counter",
            self.sessions_ended.load(Ordering::Relaxed));

        // Ledger
        metric!("birdcatch_notifications_total", "Ledger notifications shown", "counter",
            self.notifications.load(Ordering::Relaxed));
        #[cfg(feature = "metrics_extended")]
        metric!("birdcatch_ledger_failures_total", "Failed hit records and round saves", "counter",
            self.ledger_failures.load(Ordering::Relaxed));

        metric!("birdcatch_uptime_seconds", "Process uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        let value = serde_json::json!({
            "frames": {
                "count": self.frame_count.load(Ordering::Relaxed),
                "time_us": self.frame_time_us.load(Ordering::Relaxed),
                "time_p95_us": self.frame_time_p95_us.load(Ordering::Relaxed),
                "time_p99_us": self.frame_time_p99_us.load(Ordering::Relaxed),
                "time_max_us": self.frame_time_max_us.load(Ordering::Relaxed),
            },
            "birds": {
                "active": self.active_birds.load(Ordering::Relaxed),
                "pool_capacity": self.pool_capacity.load(Ordering::Relaxed),
                "pending": self.pending_spawns.load(Ordering::Relaxed),
                "spawned": self.birds_spawned.load(Ordering::Relaxed),
                "escaped": self.birds_escaped.load(Ordering::Relaxed),
                "landed": self.birds_landed.load(Ordering::Relaxed),
            },
            "scoring": {
                "hits": self.hits_total.load(Ordering::Relaxed),
                "points": self.points_total.load(Ordering::Relaxed),
            },
            "session": {
                "phase": phase_name(self.session_phase.load(Ordering::Relaxed)),
                "round_number": self.round_number.load(Ordering::Relaxed),
                "seconds_remaining": self.seconds_remaining.load(Ordering::Relaxed),
                "participants": self.participants.load(Ordering::Relaxed),
                "ended": self.sessions_ended.load(Ordering::Relaxed),
            },
            "uptime_seconds": self.uptime_seconds(),
        });
        serde_json::to_string_pretty(&value).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "metrics_extended")]
fn species_index(species: Species) -> usize {
    match species {
        Species::Bee => 0,
        Species::Butterfly => 1,
        Species::Bluebird => 2,
        Species::Legendary => 3,
    }
}

fn phase_code(phase: SessionPhase) -> u64 {
    match phase {
        SessionPhase::Lobby => 0,
        SessionPhase::Countdown => 1,
        SessionPhase::Active => 2,
        SessionPhase::WaitingForPlayers => 3,
        SessionPhase::Over => 4,
    }
}

fn phase_name(code: u64) -> &'static str {
    match code {
        0 => "lobby",
        1 => "countdown",
        2 => "active",
        3 => "waiting_for_players",
        _ => "over",
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

                    // More specific paths first
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
