//! Configuration structures for catalog backup runs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Largest page the Storefront API will serve in a single request.
pub const MAX_PAGE_SIZE: u32 = 250;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Local record store
    #[serde(default)]
    pub storage: StorageConfig,

    /// Catalog API access
    #[serde(default)]
    pub api: ApiConfig,

    /// Upstream rate-limit handling
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Startup recovery and offline retry
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Persisted log maintenance
    #[serde(default)]
    pub logs: LogConfig,
}

impl Config {
    /// Load and validate a YAML configuration file.
    pub async fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api.page_size == 0 {
            return Err(Error::Config("api.page_size must be at least 1".to_string()));
        }
        if self.api.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "api.page_size must not exceed {}",
                MAX_PAGE_SIZE
            )));
        }
        if self.api.api_version.trim().is_empty() {
            return Err(Error::Config("api.api_version must not be empty".to_string()));
        }
        if self.recovery.offline_probe_interval_secs == 0 {
            return Err(Error::Config(
                "recovery.offline_probe_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Local store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./catalog-backup.db")
}

/// Catalog API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Storefront API version segment of the endpoint path
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Products requested per page (max 250)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Override for the endpoint base URL. When unset the endpoint is
    /// derived from the storefront id as `https://{storefront}`.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            base_url: None,
        }
    }
}

fn default_api_version() -> String {
    "2024-10".to_string()
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("catalog-backup/{}", env!("CARGO_PKG_VERSION"))
}

/// Rate-limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Pause before every page request after the first (default: 500)
    #[serde(default = "default_courtesy_delay_ms")]
    pub courtesy_delay_ms: u64,

    /// Wait after a throttled response without a Retry-After hint (default: 2000)
    #[serde(default = "default_throttle_wait_ms")]
    pub default_throttle_wait_ms: u64,
}

impl RateLimitConfig {
    pub fn courtesy_delay(&self) -> Duration {
        Duration::from_millis(self.courtesy_delay_ms)
    }

    pub fn default_throttle_wait(&self) -> Duration {
        Duration::from_millis(self.default_throttle_wait_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            courtesy_delay_ms: default_courtesy_delay_ms(),
            default_throttle_wait_ms: default_throttle_wait_ms(),
        }
    }
}

fn default_courtesy_delay_ms() -> u64 {
    500
}

fn default_throttle_wait_ms() -> u64 {
    2_000
}

/// Recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Resume interrupted backups on startup (default: true)
    #[serde(default = "default_auto_resume")]
    pub auto_resume: bool,

    /// Seconds between connectivity probes while paused offline (default: 30)
    #[serde(default = "default_offline_probe_interval_secs")]
    pub offline_probe_interval_secs: u64,
}

impl RecoveryConfig {
    pub fn offline_probe_interval(&self) -> Duration {
        Duration::from_secs(self.offline_probe_interval_secs)
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            auto_resume: default_auto_resume(),
            offline_probe_interval_secs: default_offline_probe_interval_secs(),
        }
    }
}

fn default_auto_resume() -> bool {
    true
}

fn default_offline_probe_interval_secs() -> u64 {
    30
}

/// Persisted log maintenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Entries older than this many days are pruned at startup (default: 30)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}
