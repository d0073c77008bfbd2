use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::evaluator::{EvaluatorOptions, Thresholds};
use crate::fetcher::{FieldCountPolicy, MissingNetworkUsage, ParseOptions};
use crate::poller::CeilingPolicy;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub monitoring: MonitoringConfig,
    pub parsing: ParsingConfig,
    pub thresholds: Thresholds,
}

/// Remote stats endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Upper bound for one round trip (connect + request + read).
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "srv.msk01.gigacorp.local".into(),
            port: 80,
            path: "/_stats".into(),
            timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub poll_interval_secs: u64,
    /// Consecutive fetch failures tolerated before `on_error_ceiling` applies.
    pub error_ceiling: u32,
    pub on_error_ceiling: CeilingPolicy,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            error_ceiling: 3,
            on_error_ceiling: CeilingPolicy::Stop,
        }
    }
}

impl MonitoringConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    pub field_count: FieldCountPolicy,
    pub missing_network_usage: MissingNetworkUsage,
    /// Only evaluate network saturation when the feed reports a non-zero usage.
    pub require_network_usage: bool,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            field_count: FieldCountPolicy::Exact,
            missing_network_usage: MissingNetworkUsage::Zero,
            require_network_usage: true,
        }
    }
}

impl ParsingConfig {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            field_count: self.field_count,
            missing_network_usage: self.missing_network_usage,
        }
    }

    pub fn evaluator_options(&self) -> EvaluatorOptions {
        EvaluatorOptions {
            require_network_usage: self.require_network_usage,
        }
    }
}

impl AppConfig {
    /// Loads from `CONFIG_FILE` when set, else `config.toml` when present, else defaults.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::load_from_path(&path),
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from_path(DEFAULT_CONFIG_PATH)
            }
            Err(_) => {
                tracing::info!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    fn load_from_path(path: &str) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.server.host.is_empty(), "server.host must be non-empty");
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.server.path.starts_with('/'),
            "server.path must start with '/', got {:?}",
            self.server.path
        );
        anyhow::ensure!(
            self.server.timeout_secs > 0,
            "server.timeout_secs must be > 0, got {}",
            self.server.timeout_secs
        );
        anyhow::ensure!(
            self.monitoring.poll_interval_secs > 0,
            "monitoring.poll_interval_secs must be > 0, got {}",
            self.monitoring.poll_interval_secs
        );
        anyhow::ensure!(
            self.monitoring.error_ceiling > 0,
            "monitoring.error_ceiling must be > 0, got {}",
            self.monitoring.error_ceiling
        );
        anyhow::ensure!(
            self.thresholds.load_average.is_finite() && self.thresholds.load_average >= 0.0,
            "thresholds.load_average must be a non-negative number, got {}",
            self.thresholds.load_average
        );
        for (key, ratio) in [
            ("thresholds.memory_ratio", self.thresholds.memory_ratio),
            ("thresholds.disk_ratio", self.thresholds.disk_ratio),
            ("thresholds.network_ratio", self.thresholds.network_ratio),
        ] {
            anyhow::ensure!(
                (0.0..=1.0).contains(&ratio),
                "{} must be between 0 and 1, got {}",
                key,
                ratio
            );
        }
        Ok(())
    }
}
