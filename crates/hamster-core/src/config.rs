//! Configuration system for Hamster.
//!
//! Resolution order: defaults → config file → environment variables.
//! Command-line flags are applied on top by the daemon.
//!
//! Config file location:
//!   1. $HAMSTER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/hamster/config.toml
//!   3. ~/.config/hamster/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database path that keeps the store in memory only.
pub const IN_MEMORY: &str = ":memory:";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HamsterConfig {
    pub database: DatabaseConfig,
    pub crawler: CrawlerConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. `:memory:` keeps everything in memory.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// How often due nodes are sampled.
    pub tick_interval_secs: u64,
    /// Backoff applied to a node right after it is sampled.
    pub sample_cooldown_secs: u64,
    /// Floor for the re-query interval a node suggests in its response.
    pub min_requery_secs: u64,
    /// Upper bound on tracked nodes.
    pub max_nodes: usize,
    /// Nodes not seen for this long are forgotten.
    pub node_ttl_secs: u64,
    /// Period of the stats log line. 0 = disabled.
    pub stats_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Address of the DHT engine sidecar.
    pub addr: String,
    /// Routers the engine bootstraps its routing table from.
    pub bootstrap_nodes: Vec<String>,
    /// Where the engine keeps partial downloads while fetching metadata.
    pub save_path: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for DatabaseConfig {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            path: cwd.join("hamster.db"),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            sample_cooldown_secs: 60 * 60,
            min_requery_secs: 5 * 60,
            max_nodes: 500_000,
            node_ttl_secs: 6 * 60 * 60,
            stats_interval_secs: 60,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6880".to_string(),
            bootstrap_nodes: vec![
                "router.bittorrent.com:6881".to_string(),
                "dht.transmissionbt.com:6881".to_string(),
                "dht.libtorrent.org:25401".to_string(),
            ],
            save_path: std::env::temp_dir(),
        }
    }
}

impl CrawlerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn sample_cooldown(&self) -> Duration {
        Duration::from_secs(self.sample_cooldown_secs)
    }

    pub fn min_requery(&self) -> Duration {
        Duration::from_secs(self.min_requery_secs)
    }

    pub fn node_ttl(&self) -> Duration {
        Duration::from_secs(self.node_ttl_secs)
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path == Path::new(IN_MEMORY)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("hamster")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl HamsterConfig {
    /// Load config: file → env vars, on top of defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            HamsterConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("HAMSTER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply HAMSTER_* overrides using `var` to look up each key.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("HAMSTER_DB_FILE") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = var("HAMSTER_ENGINE__ADDR") {
            self.engine.addr = v;
        }
        if let Some(v) = var("HAMSTER_CRAWLER__MAX_NODES") {
            if let Ok(n) = v.parse() {
                self.crawler.max_nodes = n;
            }
        }
    }
}
