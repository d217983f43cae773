//! Application configuration loading.
//!
//! Layered precedence: built-in defaults -> config file
//! (~/.config/pulse/config.toml) -> CLI-specified file -> `PULSE_*`
//! environment variables. CLI flags are applied by the caller on top.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading failure.
#[derive(Debug, Error)]
#[error("Configuration error: {0}")]
pub struct ConfigError(pub String);

/// Daemon-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the RocksDB storage directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Scheduler poll cadence in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Per-run execution timeout in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "pulse")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_run_timeout() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            poll_interval_secs: default_poll_interval(),
            run_timeout_secs: default_run_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load configuration with layered precedence.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "pulse")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| ConfigError(e.to_string()))?
            .set_default("poll_interval_secs", default_poll_interval() as i64)
            .map_err(|e| ConfigError(e.to_string()))?
            .set_default("run_timeout_secs", default_run_timeout() as i64)
            .map_err(|e| ConfigError(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| ConfigError(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("PULSE")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build().map_err(|e| ConfigError(e.to_string()))?;
        config
            .try_deserialize()
            .map_err(|e| ConfigError(e.to_string()))
    }
}
