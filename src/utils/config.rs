// src/utils/config.rs
//! Engine configuration
//!
//! Layered as: built-in defaults, then an optional TOML file
//! (`snmpsim.toml`, or the path in `SNMPSIM_CONFIG`), then environment
//! variables such as `SNMPSIM__SESSION__TIMEOUT_MS=2000`.

use crate::utils::errors::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default configuration file stem (without extension)
pub const DEFAULT_CONFIG_FILE: &str = "snmpsim";

/// Environment variable overriding the configuration file path
pub const CONFIG_PATH_ENV: &str = "SNMPSIM_CONFIG";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: ListenerConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub agents: AgentsConfig,
    pub observability: ObservabilityConfig,
}

/// Settings for agent listeners created by the protocol engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address every agent port is bound on
    pub bind_address: IpAddr,

    /// Reject requests whose community is not registered
    pub authorization: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            authorization: true,
        }
    }
}

/// Client session settings for diagnostic walks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,

    /// Retransmissions after the first attempt
    pub retries: u32,

    /// Entries requested per round trip
    pub max_repetitions: u32,
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            retries: 1,
            max_repetitions: 1,
        }
    }
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub path: PathBuf,

    /// Keep definitions in memory only
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("db/agents.db"),
            in_memory: false,
        }
    }
}

/// Startup behaviour for stored agents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// YAML file of agent definitions loaded when the store is empty
    pub seed_file: Option<PathBuf>,

    /// Start every stored agent on boot
    pub autostart: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging and metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub log_level: String,

    pub log_format: LogFormat,

    /// Prometheus exporter listen address; disabled when unset
    pub metrics_addr: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_addr: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, file and environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&file)
    }

    /// Load configuration using an explicit file path (extension optional)
    pub fn load_from(file: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(Config::try_from(&EngineConfig::default())?)
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("SNMPSIM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
