//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section has defaults, so a partial (or empty) file is valid.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::engine::arbitrage::DEFAULT_CONCURRENCY;
use crate::engine::scoring::ScoringConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub universalis: UniversalisConfig,
    pub cache: CacheConfig,
    pub catalog: CatalogConfig,
    pub advice: AdviceConfig,
    pub scoring: ScoringConfig,
    pub arbitrage: ArbitrageConfig,
    pub worlds: WorldsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UniversalisConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Per-attempt HTTP timeout. Two attempts must fit inside the advice
    /// and arbitrage fetch budgets.
    pub timeout_secs: u64,
    /// Attempts per request, including the first.
    pub retry_max: u32,
}

impl Default for UniversalisConfig {
    fn default() -> Self {
        Self {
            base_url: "https://universalis.app/api".into(),
            user_agent: "BROKER/0.1.0 (market-advisor)".into(),
            timeout_secs: 3,
            retry_max: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// TTL for listings, which change quickly.
    pub ttl_short_secs: u64,
    /// TTL for sale history.
    pub ttl_long_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_short_secs: 600,
            ttl_long_secs: 43_200,
        }
    }
}

impl CacheConfig {
    pub fn ttl_short(&self) -> Duration {
        Duration::from_secs(self.ttl_short_secs)
    }

    pub fn ttl_long(&self) -> Duration {
        Duration::from_secs(self.ttl_long_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON file mapping item id to name, e.g. `{"5": "Fire Shard"}`.
    pub bootstrap_path: Option<String>,
    /// Fixed candidate list; when empty the provider's marketable list is used.
    pub item_ids: Vec<u32>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AdviceConfig {
    /// Concurrent snapshot fetches per advice request.
    pub fetch_concurrency: usize,
    /// Per-item fetch budget.
    pub fetch_timeout_ms: u64,
}

impl Default for AdviceConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: 8,
            fetch_timeout_ms: 10_000,
        }
    }
}

impl AdviceConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ArbitrageConfig {
    pub default_concurrency: usize,
    pub max_concurrency: usize,
    /// Per-world fetch budget.
    pub world_timeout_ms: u64,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            default_concurrency: DEFAULT_CONCURRENCY,
            max_concurrency: 8,
            world_timeout_ms: 8_000,
        }
    }
}

impl ArbitrageConfig {
    pub fn world_timeout(&self) -> Duration {
        Duration::from_millis(self.world_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct WorldsConfig {
    /// When set, only these worlds may be queried.
    pub allowed: Option<BTreeSet<String>>,
    /// Data center name to member worlds.
    pub data_centers: BTreeMap<String, Vec<String>>,
}

impl WorldsConfig {
    pub fn is_allowed(&self, world: &str) -> bool {
        match &self.allowed {
            Some(allowed) => allowed.contains(world),
            None => true,
        }
    }

    /// Worlds of a data center, restricted to the allow-list.
    pub fn worlds_in(&self, data_center: &str) -> Option<Vec<String>> {
        self.data_centers.get(data_center).map(|worlds| {
            worlds
                .iter()
                .filter(|w| self.is_allowed(w))
                .cloned()
                .collect()
        })
    }

    /// All known worlds, deduplicated and sorted.
    pub fn all_worlds(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self
            .data_centers
            .values()
            .flatten()
            .filter(|w| self.is_allowed(w))
            .collect();
        set.into_iter().cloned().collect()
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }
}
