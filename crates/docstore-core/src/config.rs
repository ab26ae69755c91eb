//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/docstore/config.toml)
//! 3. Environment variables (DOCSTORE_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "DOCSTORE";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (SQLite hot store, archive blobs)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Move a document to the cold archive as soon as it is soft deleted
    #[serde(default)]
    pub archive_on_soft_delete: bool,

    /// How many times a transient archive read is attempted before giving up
    #[serde(default = "default_unarchive_max_attempts")]
    pub unarchive_max_attempts: u32,

    /// Delay before the first archive read retry; doubles on each attempt
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    /// Concurrent documents processed by the bulk archive/unarchive calls
    #[serde(default = "default_parallel_archive_jobs")]
    pub parallel_archive_jobs: usize,

    /// Pending fire-and-forget archive commands before new ones are refused
    #[serde(default = "default_archive_queue_capacity")]
    pub archive_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            archive_on_soft_delete: false,
            unarchive_max_attempts: default_unarchive_max_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            parallel_archive_jobs: default_parallel_archive_jobs(),
            archive_queue_capacity: default_archive_queue_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (DOCSTORE_DATA_DIR, DOCSTORE_ARCHIVE_ON_SOFT_DELETE, ...)
    /// 2. Config file (~/.config/docstore/config.toml or DOCSTORE_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Create a configuration rooted at `data_dir` with every other value defaulted
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // DOCSTORE_DATA_DIR
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // DOCSTORE_ARCHIVE_ON_SOFT_DELETE
        if let Ok(val) = std::env::var(format!("{}_ARCHIVE_ON_SOFT_DELETE", ENV_PREFIX)) {
            self.archive_on_soft_delete = val.eq_ignore_ascii_case("true") || val == "1";
        }

        // DOCSTORE_UNARCHIVE_MAX_ATTEMPTS
        if let Ok(val) = std::env::var(format!("{}_UNARCHIVE_MAX_ATTEMPTS", ENV_PREFIX)) {
            if let Ok(attempts) = val.parse() {
                self.unarchive_max_attempts = attempts;
            }
        }

        // DOCSTORE_PARALLEL_ARCHIVE_JOBS
        if let Ok(val) = std::env::var(format!("{}_PARALLEL_ARCHIVE_JOBS", ENV_PREFIX)) {
            if let Ok(jobs) = val.parse() {
                self.parallel_archive_jobs = jobs;
            }
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with DOCSTORE_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docstore")
            .join("config.toml")
    }

    /// Get the path to the SQLite hot store
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("docstore.db")
    }

    /// Get the root directory of the cold archive
    pub fn archive_dir(&self) -> PathBuf {
        self.data_dir.join("archive")
    }

    /// Delay before the first archive read retry
    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docstore")
}

fn default_unarchive_max_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    100
}

fn default_parallel_archive_jobs() -> usize {
    5
}

fn default_archive_queue_capacity() -> usize {
    64
}
