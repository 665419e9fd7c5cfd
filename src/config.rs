//! Configuration for devswipe-feed

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::recommend::ScoringWeights;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("devswipe-feed")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database and config file
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Maximum pooled SQLite connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Feed pipeline settings
    #[serde(default)]
    pub feed: FeedConfig,

    /// Feed / stats cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Scoring weights
    #[serde(default)]
    pub scoring: ScoringWeights,
}

/// Feed pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Upper bound on candidates scored per request
    #[serde(default = "default_retrieval_window")]
    pub retrieval_window: i64,

    /// Page size when the caller does not pass one
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,

    /// Largest page size a caller may request
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,

    /// Deadline the HTTP layer imposes on a single request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Disable to run every request through the full pipeline
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prefix for every cache key
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Ranked feed page TTL
    #[serde(default = "default_feed_ttl")]
    pub feed_ttl_secs: u64,

    /// Item stats TTL
    #[serde(default = "default_stats_ttl")]
    pub stats_ttl_secs: u64,
}

fn default_http_port() -> u16 {
    8080
}

fn default_pool_size() -> u32 {
    8
}

fn default_retrieval_window() -> i64 {
    200
}

fn default_page_size() -> i64 {
    6
}

fn default_max_page_size() -> i64 {
    50
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "devswipe".to_string()
}

fn default_feed_ttl() -> u64 {
    10 * 60
}

fn default_stats_ttl() -> u64 {
    30 * 60
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            retrieval_window: default_retrieval_window(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl FeedConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: default_namespace(),
            feed_ttl_secs: default_feed_ttl(),
            stats_ttl_secs: default_stats_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn feed_ttl(&self) -> Duration {
        Duration::from_secs(self.feed_ttl_secs)
    }

    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            pool_size: default_pool_size(),
            feed: FeedConfig::default(),
            cache: CacheConfig::default(),
            scoring: ScoringWeights::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get SQLite database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join("feed.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}
