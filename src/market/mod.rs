//! Market-data integrations.
//!
//! Defines the two seams the engine depends on:
//! - `MarketDataPort`: listings + recent sales for one item on one world
//! - `ItemCatalog`: the stable, paginated universe of candidate items
//!
//! Implementations:
//! - `universalis`: HTTP client to the public market-board API
//! - `cache`: TTL caching decorator for any `MarketDataPort`
//! - `catalog`: in-memory catalog with optional names bootstrap

pub mod cache;
pub mod catalog;
pub mod universalis;

use async_trait::async_trait;

use crate::types::{BrokerError, ItemId, MarketSnapshot};

/// Source of per-world market snapshots.
///
/// Implementors may serve from cache. Fails with `BrokerError::Unavailable`
/// on provider/network errors and `BrokerError::NotFound` when the item has
/// no market presence on the world.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    async fn fetch(&self, item_id: ItemId, world: &str) -> Result<MarketSnapshot, BrokerError>;
}

/// Source of candidate item ids.
///
/// `candidates` must be deterministic for a given `(offset, max_candidates)`
/// so that offset-based paging never repeats or skips items.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    async fn candidates(
        &self,
        offset: usize,
        max_candidates: usize,
    ) -> Result<Vec<ItemId>, BrokerError>;

    /// Display name for an item, when known.
    async fn name(&self, item_id: ItemId) -> Option<String>;

    /// Up to `limit` items whose name contains `query` (case-insensitive),
    /// or whose id starts with it when `query` is numeric. Ascending id order.
    async fn search(&self, query: &str, limit: usize) -> Vec<(ItemId, Option<String>)>;
}
