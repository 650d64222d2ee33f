use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ubkg: UbkgConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Store location and process-level settings
#[derive(Debug, Clone, Deserialize)]
pub struct UbkgConfig {
    /// SQLite file holding the knowledge graph.
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Bounds applied to every composed query
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Upper bound for caller-supplied Expand / SpanningTree depth.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_shortest_path_max_hops")]
    pub shortest_path_max_hops: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_depth: default_max_depth(),
            shortest_path_max_hops: default_shortest_path_max_hops(),
        }
    }
}

impl QueryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Composed-query cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// 0 disables the cache.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_depth() -> usize {
    10
}

fn default_shortest_path_max_hops() -> usize {
    10
}

fn default_cache_capacity() -> usize {
    32
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in UBKG_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("UBKG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml(&config_str)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.ubkg.db_path.as_os_str().is_empty() {
            anyhow::bail!("ubkg.db_path must not be empty");
        }

        if self.query.timeout_ms == 0 {
            anyhow::bail!("query.timeout_ms must be greater than 0");
        }

        if self.query.max_depth == 0 {
            anyhow::bail!("query.max_depth must be at least 1");
        }

        if self.query.shortest_path_max_hops == 0 {
            anyhow::bail!("query.shortest_path_max_hops must be at least 1");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.ubkg.db_path
    }
}
