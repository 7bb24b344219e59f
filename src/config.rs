//! Configuration management.
//!
//! Settings load from a TOML file (`tasksync.toml` next to the binary or in
//! the platform config directory) with every field optional; missing pieces
//! fall back to the defaults in [`constants`](crate::constants).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_BACKOFF_BASE_SECS, DEFAULT_BACKOFF_MAX_SECS,
    DEFAULT_DISABLE_THRESHOLD, DEFAULT_FREQUENCY_MINUTES, DEFAULT_MAX_CONCURRENT_SYNCS,
    MAX_FREQUENCY_MINUTES,
};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "DatabaseConfig::default_url")]
    pub url: String,
}

/// Tunables for the scheduler and the per-user jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Consecutive failures after which a user's auto-sync is disabled.
    #[serde(default = "SyncConfig::default_disable_threshold")]
    pub disable_threshold: u32,
    /// Backoff scale: the retry delay after k consecutive failures is
    /// `base * 2^k`, capped below.
    #[serde(default = "SyncConfig::default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// Ceiling on the retry delay.
    #[serde(default = "SyncConfig::default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    /// Syncs allowed in flight at once across all users.
    #[serde(default = "SyncConfig::default_max_concurrent_syncs")]
    pub max_concurrent_syncs: usize,
    /// Frequency assigned to users that never chose one.
    #[serde(default = "SyncConfig::default_frequency_minutes")]
    pub default_frequency_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// Optional log file; stderr only when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl DatabaseConfig {
    fn default_url() -> String {
        "sqlite://tasksync.db?mode=rwc".to_string()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
        }
    }
}

impl SyncConfig {
    fn default_disable_threshold() -> u32 {
        DEFAULT_DISABLE_THRESHOLD
    }

    fn default_backoff_base_secs() -> u64 {
        DEFAULT_BACKOFF_BASE_SECS
    }

    fn default_backoff_max_secs() -> u64 {
        DEFAULT_BACKOFF_MAX_SECS
    }

    fn default_max_concurrent_syncs() -> usize {
        DEFAULT_MAX_CONCURRENT_SYNCS
    }

    fn default_frequency_minutes() -> u32 {
        DEFAULT_FREQUENCY_MINUTES
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            disable_threshold: Self::default_disable_threshold(),
            backoff_base_secs: Self::default_backoff_base_secs(),
            backoff_max_secs: Self::default_backoff_max_secs(),
            max_concurrent_syncs: Self::default_max_concurrent_syncs(),
            default_frequency_minutes: Self::default_frequency_minutes(),
        }
    }
}

impl LoggingConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            level: Self::default_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration, falling back to defaults when no file exists.
    pub fn load() -> Result<Self> {
        let config = match Self::find_config_file() {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Look next to the working directory first, then the platform config dir.
    fn find_config_file() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        let path = dirs::config_dir()?.join("tasksync").join(CONFIG_FILE_NAME);
        path.exists().then_some(path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            bail!("database.url must not be empty");
        }
        if self.sync.disable_threshold == 0 {
            bail!("sync.disable_threshold must be at least 1");
        }
        if self.sync.backoff_base_secs == 0 {
            bail!("sync.backoff_base_secs must be at least 1");
        }
        if self.sync.backoff_max_secs < self.sync.backoff_base_secs {
            bail!("sync.backoff_max_secs must be >= sync.backoff_base_secs");
        }
        if self.sync.max_concurrent_syncs == 0 {
            bail!("sync.max_concurrent_syncs must be at least 1");
        }
        if self.sync.default_frequency_minutes == 0
            || self.sync.default_frequency_minutes > MAX_FREQUENCY_MINUTES
        {
            bail!(
                "sync.default_frequency_minutes must be between 1 and {MAX_FREQUENCY_MINUTES}"
            );
        }
        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => bail!("logging.level {other:?} is not a valid log level"),
        }
        Ok(())
    }
}
