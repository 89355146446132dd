//! TTL caching for market snapshots.
//!
//! Wraps any `MarketDataPort` and keeps listings and sale history per
//! `(world, item)` with separate lifetimes: listings move quickly, history
//! barely changes. A snapshot is served from cache only when both halves
//! are still fresh; otherwise the inner port is asked again and both halves
//! are replaced.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::MarketDataPort;
use crate::types::{BrokerError, ItemId, Listing, MarketSnapshot, Sale};

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

struct Timed<T> {
    value: T,
    inserted_at: Instant,
}

impl<T> Timed<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() < ttl
    }
}

struct CacheEntry {
    listings: Timed<Vec<Listing>>,
    history: Timed<Vec<Sale>>,
}

type CacheKey = (String, ItemId);

/// Caching decorator over a `MarketDataPort`.
pub struct CachedMarketData<P> {
    inner: P,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    listings_ttl: Duration,
    history_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<P: MarketDataPort> CachedMarketData<P> {
    pub fn new(inner: P, listings_ttl: Duration, history_ttl: Duration) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
            listings_ttl,
            history_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn lookup(&self, key: &CacheKey) -> Option<MarketSnapshot> {
        let entries = self.entries.lock().await;
        let entry = entries.get(key)?;
        if entry.listings.is_fresh(self.listings_ttl) && entry.history.is_fresh(self.history_ttl) {
            Some(MarketSnapshot::new(
                key.1,
                key.0.clone(),
                entry.listings.value.clone(),
                entry.history.value.clone(),
            ))
        } else {
            None
        }
    }

    async fn store(&self, snapshot: &MarketSnapshot) {
        let key = (snapshot.world.clone(), snapshot.item_id);
        let mut entries = self.entries.lock().await;
        entries.insert(
            key,
            CacheEntry {
                listings: Timed::new(snapshot.listings.clone()),
                history: Timed::new(snapshot.recent_history.clone()),
            },
        );
    }

    /// Remove entries that can no longer be served, i.e. either half expired.
    pub async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| {
            e.listings.is_fresh(self.listings_ttl) && e.history.is_fresh(self.history_ttl)
        });
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Cache hit rate as a fraction (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[async_trait]
impl<P: MarketDataPort> MarketDataPort for CachedMarketData<P> {
    async fn fetch(&self, item_id: ItemId, world: &str) -> Result<MarketSnapshot, BrokerError> {
        let key = (world.to_string(), item_id);
        if let Some(snapshot) = self.lookup(&key).await {
            debug!(item_id, world = %world, "Cache hit");
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(snapshot);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.inner.fetch(item_id, world).await?;
        self.store(&snapshot).await;
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
