//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::ai::AiConfig;
use crate::game::physics::{FieldConfig, SpeedProfile};

/// Default per-tick speed increment for the ramping profile
pub const DEFAULT_SPEED_RAMP: f32 = 0.02;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma separated), any origin when unset
    pub client_origin: Option<String>,
    /// Upper bound on concurrently tracked matches
    pub max_matches: usize,
    /// Simulation settings shared by every match
    pub game: GameConfig,
}

/// Settings for match sessions and their physics
#[derive(Clone, Debug, PartialEq)]
pub struct GameConfig {
    pub field: FieldConfig,
    pub speed_profile: SpeedProfile,
    /// Time between two simulation ticks
    pub tick_interval: Duration,
    /// Points needed to win a match
    pub win_score: u32,
    pub ai: AiConfig,
    /// Fixed seed for the registry's seed generator (reproducible matches)
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            field: FieldConfig::default(),
            speed_profile: SpeedProfile::Constant,
            tick_interval: Duration::from_millis(50),
            win_score: 5,
            ai: AiConfig::default(),
            seed: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_level: "info".to_string(),
            client_origin: None,
            max_matches: 1000,
            game: GameConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key/value source, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr: SocketAddr = match (lookup("PORT"), lookup("SERVER_ADDR")) {
            (Some(port), _) => format!("0.0.0.0:{}", port)
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            (None, Some(addr)) => addr.parse().map_err(|_| ConfigError::InvalidAddress)?,
            (None, None) => defaults.server_addr,
        };

        let mut game = GameConfig::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, "TICK_INTERVAL_MS")? {
            if ms == 0 {
                return Err(ConfigError::invalid("TICK_INTERVAL_MS", "0"));
            }
            game.tick_interval = Duration::from_millis(ms);
        }

        if let Some(score) = parse_var::<u32, _>(&lookup, "WIN_SCORE")? {
            if score == 0 {
                return Err(ConfigError::invalid("WIN_SCORE", "0"));
            }
            game.win_score = score;
        }

        let increment = parse_var::<f32, _>(&lookup, "BALL_SPEED_RAMP")?.unwrap_or(DEFAULT_SPEED_RAMP);
        game.speed_profile = match lookup("BALL_SPEED_MODE").as_deref() {
            None | Some("constant") => SpeedProfile::Constant,
            Some("ramp") => {
                if !increment.is_finite() || increment <= 0.0 {
                    return Err(ConfigError::invalid("BALL_SPEED_RAMP", &increment.to_string()));
                }
                SpeedProfile::Ramp { increment }
            }
            Some(other) => return Err(ConfigError::invalid("BALL_SPEED_MODE", other)),
        };

        game.seed = parse_var::<u64, _>(&lookup, "GAME_SEED")?;

        Ok(Self {
            server_addr,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            client_origin: lookup("CLIENT_ORIGIN").filter(|s| !s.trim().is_empty()),
            max_matches: parse_var(&lookup, "MAX_MATCHES")?.unwrap_or(defaults.max_matches),
            game,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::invalid(key, &raw)),
        None => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
        }
    }
}
