//! Application configuration.
//!
//! Aggregates configuration into a single Config struct that can be loaded
//! from YAML files or environment variables.

mod storage;

pub use storage::{StorageConfig, StorageType};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "changefeed.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "CHANGEFEED_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "CHANGEFEED";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "CHANGEFEED_LOG";
/// Environment variable for the tail binary's exclusive starting change.
pub const TAIL_SINCE_ENV_VAR: &str = "CHANGEFEED_TAIL_SINCE";

use serde::Deserialize;

use crate::feed::FeedOptions;

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Feed configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// First change number handed out on an empty store.
    pub start: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            start: FeedOptions::DEFAULT_START,
        }
    }
}

impl From<&FeedConfig> for FeedOptions {
    fn from(config: &FeedConfig) -> Self {
        FeedOptions {
            start: config.start,
        }
    }
}

/// Live-tail configuration for the tail binary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Exclusive lower bound; `None` tails from the first change.
    pub since: Option<u64>,
    /// Stop after this many entries.
    pub limit: Option<usize>,
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed configuration.
    pub feed: FeedConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Tail configuration.
    pub tail: TailConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `changefeed.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;
        config.apply_tail_override()?;
        Ok(config)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }

    fn apply_tail_override(&mut self) -> Result<(), ConfigError> {
        if let Ok(since) = std::env::var(TAIL_SINCE_ENV_VAR) {
            let since = since.parse().map_err(|e| ConfigError::Invalid {
                name: TAIL_SINCE_ENV_VAR,
                message: format!("{since:?}: {e}"),
            })?;
            self.tail.since = Some(since);
        }
        Ok(())
    }
}
