//! In-memory item catalog.
//!
//! Holds an ascending, deduplicated list of item ids so `candidates` is a
//! pure slice operation: the same `(offset, max_candidates)` always yields
//! the same page, and consecutive pages never overlap.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use super::ItemCatalog;
use crate::types::{BrokerError, ItemId};

/// Catalog backed by a fixed id list plus an optional id→name map.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    ids: Vec<ItemId>,
    names: HashMap<ItemId, String>,
}

impl StaticCatalog {
    pub fn new(mut ids: Vec<ItemId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self {
            ids,
            names: HashMap::new(),
        }
    }

    pub fn with_names(mut self, names: HashMap<ItemId, String>) -> Self {
        self.names = names;
        self
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn names_count(&self) -> usize {
        self.names.len()
    }
}

#[async_trait]
impl ItemCatalog for StaticCatalog {
    async fn candidates(
        &self,
        offset: usize,
        max_candidates: usize,
    ) -> Result<Vec<ItemId>, BrokerError> {
        Ok(self
            .ids
            .iter()
            .skip(offset)
            .take(max_candidates)
            .copied()
            .collect())
    }

    async fn name(&self, item_id: ItemId) -> Option<String> {
        self.names.get(&item_id).cloned()
    }

    /// A leading `#` on a numeric query is ignored.
    async fn search(&self, query: &str, limit: usize) -> Vec<(ItemId, Option<String>)> {
        let raw = query.trim();
        let needle = raw.to_lowercase();
        let digits = raw.trim_start_matches('#');
        let numeric = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());

        self.ids
            .iter()
            .filter(|id| {
                let name_hit = self
                    .names
                    .get(id)
                    .map(|n| n.to_lowercase().contains(&needle))
                    .unwrap_or(false);
                name_hit || (numeric && id.to_string().starts_with(digits))
            })
            .take(limit)
            .map(|id| (*id, self.names.get(id).cloned()))
            .collect()
    }
}

/// Load an id→name map from a JSON object file such as
/// `{"5": "Fire Shard", "6": "Ice Shard"}`. Non-numeric keys are skipped.
pub fn load_names(path: &str) -> Result<HashMap<ItemId, String>> {
    if !Path::new(path).exists() {
        info!(path, "No item names file found, continuing without names");
        return Ok(HashMap::new());
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read item names from {path}"))?;
    parse_names(&json).with_context(|| format!("Failed to parse item names from {path}"))
}

fn parse_names(json: &str) -> Result<HashMap<ItemId, String>> {
    let raw: HashMap<String, String> = serde_json::from_str(json)?;
    let mut names = HashMap::with_capacity(raw.len());
    for (key, name) in raw {
        match key.parse::<ItemId>() {
            Ok(id) => {
                names.insert(id, name);
            }
            Err(_) => warn!(key = %key, "Skipping non-numeric item id in names file"),
        }
    }
    Ok(names)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
