use crate::game::constants::arena::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::lobby::session::GameMode;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Arena size in logical pixels
    pub arena_width: f32,
    pub arena_height: f32,
    pub mode: GameMode,
    /// Bot participants in the headless room
    pub bot_count: usize,
    /// Rounds to play before the host ends the session
    pub rounds: u32,
    /// Display frame interval (16ms ~ 60Hz)
    pub frame_interval_ms: u64,
    /// Base seed for spawn and motion randomness (None = entropy)
    pub seed: Option<u64>,
    pub metrics_port: u16,
    /// External ledger base URL (None = log only)
    pub ledger_url: Option<String>,
    /// Wallet address used for ledger calls (None = calls skipped)
    pub wallet_address: Option<String>,
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("arena must be at least 1x1, got {width}x{height}")]
    ArenaTooSmall { width: f32, height: f32 },
    #[error("frame interval must be > 0")]
    ZeroFrameInterval,
    #[error("{mode} mode needs at least {required} participant(s), got {count}")]
    NotEnoughBots {
        mode: &'static str,
        required: usize,
        count: usize,
    },
    #[error("rounds must be at least 1")]
    ZeroRounds,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            arena_width: DEFAULT_WIDTH,
            arena_height: DEFAULT_HEIGHT,
            mode: GameMode::Multiplayer,
            bot_count: 3,
            rounds: 2,
            frame_interval_ms: 16,
            seed: None,
            metrics_port: 9090,
            ledger_url: None,
            wallet_address: None,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl GameConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(width) = parse_env::<f32>("ARENA_WIDTH") {
            config.arena_width = width;
        }
        if let Some(height) = parse_env::<f32>("ARENA_HEIGHT") {
            config.arena_height = height;
        }

        if let Ok(mode) = std::env::var("GAME_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "solo" => config.mode = GameMode::Solo,
                "multiplayer" => config.mode = GameMode::Multiplayer,
                _ => tracing::warn!("Invalid GAME_MODE '{}', using default", mode),
            }
        }

        if let Some(count) = parse_env::<usize>("BOT_COUNT") {
            if (1..=64).contains(&count) {
                config.bot_count = count;
            } else {
                tracing::warn!("BOT_COUNT must be 1-64, using default");
            }
        }

        if let Some(rounds) = parse_env::<u32>("ROUNDS") {
            config.rounds = rounds;
        }

        if let Some(interval) = parse_env::<u64>("FRAME_INTERVAL_MS") {
            if interval > 0 {
                config.frame_interval_ms = interval;
            } else {
                tracing::warn!("FRAME_INTERVAL_MS must be > 0, using default");
            }
        }

        config.seed = parse_env::<u64>("SIM_SEED");

        if let Some(port) = parse_env::<u16>("METRICS_PORT") {
            config.metrics_port = port;
        }

        config.ledger_url = non_empty_env("LEDGER_URL");
        config.wallet_address = non_empty_env("WALLET_ADDRESS");

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.arena_width >= 1.0 && self.arena_height >= 1.0) {
            return Err(ConfigError::ArenaTooSmall {
                width: self.arena_width,
                height: self.arena_height,
            });
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::ZeroFrameInterval);
        }
        let required = self.mode.min_participants();
        if self.bot_count < required {
            return Err(ConfigError::NotEnoughBots {
                mode: self.mode.as_str(),
                required,
                count: self.bot_count,
            });
        }
        if self.rounds == 0 {
            return Err(ConfigError::ZeroRounds);
        }
        Ok(())
    }
}
