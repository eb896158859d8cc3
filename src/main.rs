use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use birdcatch_arena::client::{Client, ClientEvent, ClientOptions, ClientStatus};
use birdcatch_arena::config::GameConfig;
use birdcatch_arena::game::game_loop::GameLoopEvent;
use birdcatch_arena::game::input_buffer::InputSender;
use birdcatch_arena::game::state::{Arena, BirdPhase};
use birdcatch_arena::ledger::{LedgerClient, LoggingLedger, StaticIdentity};
use birdcatch_arena::lobby::replication::InMemoryHub;
use birdcatch_arena::lobby::session::{NextRound, SessionEvent, SessionPhase};
use birdcatch_arena::metrics::{self, Metrics};

/// Pause on the results screen before the host moves on
const RESULTS_PAUSE_MS: u64 = 3000;

/// Headless participant that clicks near flying birds with imperfect aim
struct Bot {
    name: String,
    client: Client,
    input: InputSender,
    rng: StdRng,
    /// Chance to click on a given frame
    eagerness: f64,
    /// Aim error as a multiple of the hit radius
    aim_error: f32,
}

impl Bot {
    fn act(&mut self) {
        if !self.client.state().is_simulating() || !self.rng.gen_bool(self.eagerness) {
            return;
        }
        let arena = *self.client.arena();
        let targets: Vec<_> = self
            .client
            .snapshot()
            .into_iter()
            .filter(|b| b.phase == BirdPhase::Flying && !arena.is_beyond(b.position, 0.0))
            .collect();
        if targets.is_empty() {
            return;
        }

        let target = targets[self.rng.gen_range(0..targets.len())];
        let spread = self.aim_error * arena.hit_radius();
        let x = target.position.x + self.rng.gen_range(-spread..=spread);
        let y = target.position.y + self.rng.gen_range(-spread..=spread);
        if let Err(e) = self.input.press(x, y) {
            debug!("{} dropped a click: {}", self.name, e);
        }
    }
}

fn ledger_clients(config: &GameConfig) -> Vec<LedgerClient> {
    #[cfg(feature = "http_ledger")]
    if let Some(url) = &config.ledger_url {
        info!("Recording hits to {}", url);
        let ledger = Arc::new(birdcatch_arena::ledger::HttpLedger::new(url.clone()));
        return (0..config.bot_count)
            .map(|_| LedgerClient::spawn(ledger.clone()).0)
            .collect();
    }
    #[cfg(not(feature = "http_ledger"))]
    if config.ledger_url.is_some() {
        warn!("LEDGER_URL set but built without http_ledger, logging only");
    }

    let ledger = Arc::new(LoggingLedger::new());
    (0..config.bot_count)
        .map(|_| LedgerClient::spawn(ledger.clone()).0)
        .collect()
}

fn log_event(bot: &Bot, event: &ClientEvent) {
    match event {
        ClientEvent::Session(event) if bot.client.is_host() => info!("[{}] {:?}", bot.name, event),
        ClientEvent::Session(_) => {}
        ClientEvent::Game(GameLoopEvent::BirdHit(hit)) => debug!(
            "[{}] hit {} for {} pts",
            bot.name,
            hit.species.name(),
            hit.points
        ),
        ClientEvent::Game(_) => {}
        ClientEvent::Notification(note) => warn!("[{}] {}", bot.name, note.message),
        ClientEvent::Excluded => warn!("[{}] locked out of the room", bot.name),
        ClientEvent::RoundSubmitted { round_number } => {
            debug!("[{}] round {} submitted", bot.name, round_number)
        }
    }
}

/// Host decisions a human would make from the UI
fn drive_host(bots: &mut [Bot], now_ms: u64, config: &GameConfig, over_since: &mut Option<u64>) {
    let Some(host) = bots
        .iter_mut()
        .find(|b| b.client.status() == ClientStatus::Joined && b.client.is_host())
    else {
        return;
    };

    match host.client.state().phase {
        SessionPhase::Lobby => {
            if let Err(e) = host.client.start_round() {
                debug!("Cannot start yet: {}", e);
            }
        }
        SessionPhase::Over => {
            let since = *over_since.get_or_insert(now_ms);
            if now_ms.saturating_sub(since) < RESULTS_PAUSE_MS {
                return;
            }
            *over_since = None;
            for (id, score) in host.client.scoreboard() {
                info!("Round {}: {} scored {} ({} hits)", host.client.state().round_number, id, score.total_score, score.total_hits);
            }
            let result = if host.client.state().round_number >= config.rounds {
                host.client.end_session().map(|_| ())
            } else {
                host.client.next_round(NextRound::Countdown).map(|_| ())
            };
            if let Err(e) = result {
                warn!("Host action failed: {}", e);
            }
        }
        _ => *over_since = None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Bird Catch Arena v{}", env!("CARGO_PKG_VERSION"));

    let config = GameConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {}x{}, mode={}, bots={}, rounds={}",
        config.arena_width,
        config.arena_height,
        config.mode.as_str(),
        config.bot_count,
        config.rounds
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let base_seed = config.seed.unwrap_or_else(rand::random);
    info!("Simulation seed {}", base_seed);
    let mut seeds = StdRng::seed_from_u64(base_seed);

    let hub = InMemoryHub::new();
    let arena = Arena::new(config.arena_width, config.arena_height);
    let mut bots: Vec<Bot> = ledger_clients(&config)
        .into_iter()
        .enumerate()
        .map(|(i, ledger)| {
            let seed = seeds.gen();
            let identity = match &config.wallet_address {
                Some(address) => StaticIdentity::new(format!("{}-{}", address, i)),
                None => StaticIdentity::anonymous(),
            };
            let client = Client::new(
                Arc::new(hub.join()),
                ClientOptions {
                    mode: config.mode,
                    arena,
                    seed,
                },
            )
            .with_ledger(ledger)
            .with_identity(identity)
            .with_metrics(metrics.clone());
            Bot {
                name: format!("bot-{}", i),
                input: client.input(),
                client,
                rng: StdRng::seed_from_u64(seed ^ 0x5eed),
                eagerness: seeds.gen_range(0.02..0.08),
                aim_error: seeds.gen_range(0.3..1.6),
            }
        })
        .collect();

    let start = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(config.frame_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut over_since = None;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }

        let now_ms = start.elapsed().as_millis() as u64;
        for bot in bots.iter_mut() {
            bot.act();
            for event in bot.client.frame(now_ms) {
                if matches!(event, ClientEvent::Session(SessionEvent::SessionEnded { .. })) {
                    info!("[{}] session ended", bot.name);
                }
                log_event(bot, &event);
            }
        }
        drive_host(&mut bots, now_ms, &config, &mut over_since);

        if bots.iter().all(|b| b.client.status() != ClientStatus::Joined) {
            break;
        }
    }

    if let Some(bot) = bots.first() {
        for result in bot.client.state().results.values() {
            info!(
                "Round {} winner: {:?} ({} hits total)",
                result.round_number, result.winner_id, result.total_hits
            );
        }
    }
    for bot in bots.iter_mut() {
        bot.client.leave();
    }

    // Give in-flight ledger calls a moment to finish
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("Stopped");

    Ok(())
}
