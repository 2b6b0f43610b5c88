//! Configuration
//!
//! Game timing and server settings, loadable from the environment.
//! Malformed values fail fast at startup; nothing is validated per-call.

use std::net::SocketAddr;
use std::time::Duration;

use crate::game::crash_point::Mode;

/// Configuration errors. Surfaced once, at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// The offending variable.
        key: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Round timing and generator settings.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// How long bets stay open before takeoff.
    pub waiting_duration: Duration,
    /// How long the crashed result stays on display.
    pub crashed_duration: Duration,
    /// Driver tick cadence while flying.
    pub tick_interval: Duration,
    /// Initial crash-point generator mode.
    pub mode: Mode,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            waiting_duration: Duration::from_secs(5),
            crashed_duration: Duration::from_secs(3),
            tick_interval: Duration::from_millis(100),
            mode: Mode::Normal,
        }
    }
}

impl GameConfig {
    /// Load from environment variables, falling back to defaults:
    /// `CRASH_WAITING_SECS`, `CRASH_DISPLAY_SECS`, `CRASH_TICK_MS`,
    /// `CRASH_MODE` (`normal`|`boosted`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            waiting_duration: env_secs("CRASH_WAITING_SECS", defaults.waiting_duration)?,
            crashed_duration: env_secs("CRASH_DISPLAY_SECS", defaults.crashed_duration)?,
            tick_interval: env_millis("CRASH_TICK_MS", defaults.tick_interval)?,
            mode: match std::env::var("CRASH_MODE") {
                Ok(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                    key: "CRASH_MODE",
                    reason,
                })?,
                Err(_) => defaults.mode,
            },
        })
    }
}

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Idle-connection timeout.
    pub idle_timeout: Duration,
    /// Shared secret external drivers present with `advance` requests.
    /// Empty disables wire-driven advances entirely.
    pub driver_secret: String,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static addr parses"),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            driver_secret: String::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Load from environment variables, falling back to defaults:
    /// `CRASH_BIND_ADDR`, `CRASH_MAX_CONNECTIONS`, `CRASH_DRIVER_SECRET`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: match std::env::var("CRASH_BIND_ADDR") {
                Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                    key: "CRASH_BIND_ADDR",
                    reason: format!("{e}"),
                })?,
                Err(_) => defaults.bind_addr,
            },
            max_connections: match std::env::var("CRASH_MAX_CONNECTIONS") {
                Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                    key: "CRASH_MAX_CONNECTIONS",
                    reason: format!("{e}"),
                })?,
                Err(_) => defaults.max_connections,
            },
            driver_secret: std::env::var("CRASH_DRIVER_SECRET").unwrap_or_default(),
            idle_timeout: defaults.idle_timeout,
            version: defaults.version,
        })
    }
}

fn env_secs(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::Invalid {
                key,
                reason: format!("{e}"),
            }),
        Err(_) => Ok(default),
    }
}

fn env_millis(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::Invalid {
                key,
                reason: format!("{e}"),
            }),
        Err(_) => Ok(default),
    }
}
