//! Mock market for integration testing.
//!
//! Provides deterministic `MarketDataPort` and `ItemCatalog`
//! implementations backed by in-memory snapshots, with a fetch log and a
//! forced-error switch so tests can observe and steer the engine.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use broker::market::{ItemCatalog, MarketDataPort};
use broker::types::*;

/// In-memory market keyed by `(world, item_id)`.
///
/// Items without a snapshot on a world answer `NotFound`.
#[derive(Clone, Default)]
pub struct MockMarket {
    snapshots: Arc<Mutex<HashMap<(String, ItemId), MarketSnapshot>>>,
    fetch_log: Arc<Mutex<Vec<(ItemId, String)>>>,
    /// If set, every fetch fails with `Unavailable` carrying this message.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockMarket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item whose lowest ask is `lowest` and which sold `sales` times
    /// at `resale`, one sale per day.
    pub fn with_item(self, world: &str, item_id: ItemId, lowest: u64, resale: u64, sales: i64) -> Self {
        let snapshot = snapshot(item_id, world, lowest, resale, sales);
        self.snapshots
            .lock()
            .unwrap()
            .insert((world.to_string(), item_id), snapshot);
        self
    }

    /// Add an item that is listed but has never sold.
    pub fn with_unsold_item(self, world: &str, item_id: ItemId, lowest: u64) -> Self {
        self.with_item(world, item_id, lowest, 0, 0)
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_log.lock().unwrap().len()
    }

    /// Item ids fetched so far, in call order.
    pub fn fetched_items(&self) -> Vec<ItemId> {
        self.fetch_log.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    /// Worlds fetched so far, in call order.
    pub fn fetched_worlds(&self) -> Vec<String> {
        self.fetch_log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, w)| w.clone())
            .collect()
    }

    pub fn reset_log(&self) {
        self.fetch_log.lock().unwrap().clear();
    }
}

#[async_trait]
impl MarketDataPort for MockMarket {
    async fn fetch(&self, item_id: ItemId, world: &str) -> Result<MarketSnapshot, BrokerError> {
        self.fetch_log
            .lock()
            .unwrap()
            .push((item_id, world.to_string()));

        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(BrokerError::Unavailable {
                item_id,
                world: world.to_string(),
                message: msg,
            });
        }

        self.snapshots
            .lock()
            .unwrap()
            .get(&(world.to_string(), item_id))
            .cloned()
            .ok_or_else(|| BrokerError::NotFound {
                item_id,
                world: world.to_string(),
            })
    }
}

/// Catalog that can be switched into a failing state.
#[derive(Clone)]
pub struct MockCatalog {
    ids: Vec<ItemId>,
    failing: Arc<Mutex<bool>>,
}

impl MockCatalog {
    pub fn new(ids: Vec<ItemId>) -> Self {
        Self {
            ids,
            failing: Arc::new(Mutex::new(false)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl ItemCatalog for MockCatalog {
    async fn candidates(
        &self,
        offset: usize,
        max_candidates: usize,
    ) -> Result<Vec<ItemId>, BrokerError> {
        if *self.failing.lock().unwrap() {
            return Err(BrokerError::Catalog("catalog backend unreachable".into()));
        }
        Ok(self.ids.iter().skip(offset).take(max_candidates).copied().collect())
    }

    async fn name(&self, item_id: ItemId) -> Option<String> {
        Some(format!("Item #{item_id}"))
    }

    async fn search(&self, query: &str, limit: usize) -> Vec<(ItemId, Option<String>)> {
        self.ids
            .iter()
            .filter(|id| id.to_string().starts_with(query))
            .take(limit)
            .map(|id| (*id, Some(format!("Item #{id}"))))
            .collect()
    }
}

/// One listing at `lowest`, `sales` sales at `resale` one day apart.
pub fn snapshot(item_id: ItemId, world: &str, lowest: u64, resale: u64, sales: i64) -> MarketSnapshot {
    let start = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
    MarketSnapshot::new(
        item_id,
        world,
        vec![Listing {
            price_per_unit: lowest,
            quantity: 1,
            is_high_quality: false,
        }],
        (0..sales)
            .map(|d| Sale {
                timestamp: start + Duration::days(d),
                price_per_unit: resale,
                quantity: 1,
                is_high_quality: false,
            })
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Tests for the mock itself
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mock_fetch_known_and_unknown() {
    let market = MockMarket::new().with_item("Phoenix", 5, 100, 150, 3);

    let snap = market.fetch(5, "Phoenix").await.unwrap();
    assert_eq!(snap.lowest_price(), Some(100));
    assert_eq!(snap.recent_history.len(), 3);

    let err = market.fetch(5, "Shiva").await.unwrap_err();
    assert!(matches!(err, BrokerError::NotFound { .. }));
    assert_eq!(market.fetch_count(), 2);
}

#[tokio::test]
async fn test_mock_forced_error() {
    let market = MockMarket::new().with_item("Phoenix", 5, 100, 150, 3);
    market.set_error("maintenance");
    assert!(matches!(
        market.fetch(5, "Phoenix").await,
        Err(BrokerError::Unavailable { .. })
    ));
    market.clear_error();
    assert!(market.fetch(5, "Phoenix").await.is_ok());
}

#[tokio::test]
async fn test_mock_catalog_pages() {
    let catalog = MockCatalog::new((1..=10).collect());
    assert_eq!(catalog.candidates(8, 5).await.unwrap(), vec![9, 10]);
    assert_eq!(catalog.search("1", 5).await.len(), 2);
    catalog.set_failing(true);
    assert!(catalog.candidates(0, 5).await.is_err());
}
