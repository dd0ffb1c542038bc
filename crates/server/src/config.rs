//! Server configuration.
//!
//! Values come from `config.toml` when present, then from the `SERVER_HOST`,
//! `SERVER_PORT` and `TICK_RATE` environment variables. Invalid values fall
//! back to defaults with a warning; only a malformed `config.toml` is an error.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const ENV_HOST: &str = "SERVER_HOST";
pub const ENV_PORT: &str = "SERVER_PORT";
pub const ENV_TICK_RATE: &str = "TICK_RATE";

/// Highest rate that still yields a non-zero millisecond interval.
pub const MAX_TICK_RATE: u32 = 1000;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load `config.toml` if it exists, then apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::from_file(Path::new("config.toml"))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a TOML file, or defaults when it does not exist.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("No {} found, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(contents)?;
        config.server.validate();
        Ok(config)
    }

    /// Apply overrides looked up by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = &mut self.server;

        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.is_empty()) {
            server.host = host;
        }

        if let Some(port) = lookup(ENV_PORT).filter(|p| !p.is_empty()) {
            match port.parse() {
                Ok(port) => server.port = port,
                Err(e) => warn!("Ignoring {}={:?}: {}", ENV_PORT, port, e),
            }
        }

        if let Some(rate) = lookup(ENV_TICK_RATE).filter(|r| !r.is_empty()) {
            match rate.parse() {
                Ok(rate) => server.tick_rate = rate,
                Err(e) => warn!("Ignoring {}={:?}: {}", ENV_TICK_RATE, rate, e),
            }
        }

        server.validate();
    }
}

/// Listener and tick settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Ticks per second.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tick_rate: default_tick_rate(),
        }
    }
}

impl ServerConfig {
    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Time between ticks: `1000ms / tick_rate`, whole milliseconds.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.tick_rate.clamp(1, MAX_TICK_RATE)))
    }

    fn validate(&mut self) {
        if self.tick_rate == 0 || self.tick_rate > MAX_TICK_RATE {
            warn!(
                "Tick rate {} out of range 1..={}, using {}",
                self.tick_rate,
                MAX_TICK_RATE,
                default_tick_rate()
            );
            self.tick_rate = default_tick_rate();
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_tick_rate() -> u32 {
    20
}
