//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every key is optional; missing sections fall back to defaults.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Longest accepted tick interval (one year)
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Keep tick periods within what `tokio::time::interval_at` can schedule
fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(Duration::from_secs(1), MAX_INTERVAL)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Maximum concurrently served connections (admission slots)
    pub max_connections: usize,
    /// Buffer size of the worker -> scheduler hand-off channel
    pub handoff_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 4268,
            max_connections: 10,
            handoff_capacity: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub raw_report_interval_secs: u64,
    pub flush_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { raw_report_interval_secs: 10, flush_interval_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub lookback_secs: u64,
    pub lookahead_secs: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { lookback_secs: 60, lookahead_secs: 0 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus metrics HTTP port (0 to disable)
    pub prometheus_port: u16,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub schedule: ScheduleConfig,
    pub window: WindowConfig,
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    bind_address: String,
    port: u16,
    max_connections: usize,
    handoff_capacity: usize,
    raw_report_interval: Duration,
    flush_interval: Duration,
    lookback: Duration,
    lookahead: Duration,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            bind_address: toml_config.server.bind_address,
            port: toml_config.server.port,
            max_connections: toml_config.server.max_connections.max(1),
            handoff_capacity: toml_config.server.handoff_capacity.max(1),
            raw_report_interval: clamp_interval(Duration::from_secs(
                toml_config.schedule.raw_report_interval_secs,
            )),
            flush_interval: clamp_interval(Duration::from_secs(
                toml_config.schedule.flush_interval_secs,
            )),
            lookback: Duration::from_secs(toml_config.window.lookback_secs),
            lookahead: Duration::from_secs(toml_config.window.lookahead_secs),
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file,
        }
    }

    /// Determine config file path from an explicit argument or environment
    pub fn resolve_config_path(arg: Option<&str>) -> String {
        if let Some(path) = arg {
            return path.to_string();
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// "address:port" for the ingest listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn handoff_capacity(&self) -> usize {
        self.handoff_capacity
    }

    pub fn raw_report_interval(&self) -> Duration {
        self.raw_report_interval
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    pub fn lookahead(&self) -> Duration {
        self.lookahead
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn with_bind_address(mut self, addr: &str) -> Self {
        self.bind_address = addr.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = clamp_interval(interval);
        self
    }

    pub fn with_raw_report_interval(mut self, interval: Duration) -> Self {
        self.raw_report_interval = clamp_interval(interval);
        self
    }
}
