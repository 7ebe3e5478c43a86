//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Shared settings for all importers
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub http: HttpConfig,
    pub workers: WorkersConfig,
    pub cache: CacheConfig,
}

/// Network behaviour of every remote call
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay in milliseconds (doubles per retry)
    pub backoff_ms: u64,
    pub verify_ssl: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_retries: 3,
            backoff_ms: 1000,
            verify_ssl: true,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.backoff_ms))
    }
}

/// Worker pool sizing for batched fetches
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub threads: usize,
    pub batch_size: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            threads: cpus.min(8),
            batch_size: 1,
        }
    }
}

/// Location of disk-backed caches
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Shared cache directory; `None` gives each importer its own temp dir.
    #[serde(deserialize_with = "deserialize_env_path")]
    pub dir: Option<PathBuf>,
}

/// Deserialize a path that may be an environment variable reference like ${VAR}
fn deserialize_env_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)).map(PathBuf::from))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Settings {
    /// Load settings from default locations
    ///
    /// Search order:
    /// 1. ./devdata.toml (current directory)
    /// 2. ~/.config/devdata/config.toml
    ///
    /// If no file is found, returns defaults.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("devdata.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "devdata") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load settings from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        anyhow::ensure!(settings.workers.threads > 0, "workers.threads must be at least 1");
        anyhow::ensure!(
            settings.workers.batch_size > 0,
            "workers.batch_size must be at least 1"
        );

        log::info!("Loaded config from {}", path.display());
        Ok(settings)
    }
}
