//! Cross-world arbitrage scanner.
//!
//! Looks up one item's lowest ask on every requested world using a fixed
//! pool of workers. Workers claim worlds through a shared atomic cursor and
//! send what they find to a single collector over a channel, so no result
//! list is ever shared between tasks.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::metrics::median;
use crate::market::MarketDataPort;
use crate::types::{ArbitrageReport, ArbitrageResult, ItemId};

/// Worker count used when the caller doesn't pick one.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Bounded fan-out of lowest-ask lookups across worlds.
#[derive(Clone)]
pub struct ArbitrageScanner {
    market: Arc<dyn MarketDataPort>,
    world_timeout: Duration,
}

impl ArbitrageScanner {
    pub fn new(market: Arc<dyn MarketDataPort>, world_timeout: Duration) -> Self {
        Self {
            market,
            world_timeout,
        }
    }

    /// Lowest ask for `item_id` on each of `worlds`, cheapest first.
    ///
    /// Duplicate world names are scanned once. `concurrency` is clamped to
    /// `[1, worlds]`. A world that fails or times out is reported with no
    /// price rather than failing the scan.
    pub async fn scan(
        &self,
        item_id: ItemId,
        worlds: &[String],
        concurrency: usize,
    ) -> ArbitrageReport {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let worlds: Arc<Vec<String>> = Arc::new(
            worlds
                .iter()
                .filter(|w| seen.insert((*w).clone()))
                .cloned()
                .collect(),
        );

        if worlds.is_empty() {
            return ArbitrageReport {
                item_id,
                results: Vec::new(),
                median: None,
            };
        }

        let workers = concurrency.clamp(1, worlds.len());
        let cursor = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel::<(usize, Option<u64>)>(worlds.len());

        for _ in 0..workers {
            let market = Arc::clone(&self.market);
            let worlds = Arc::clone(&worlds);
            let cursor = Arc::clone(&cursor);
            let tx = tx.clone();
            let timeout = self.world_timeout;

            tokio::spawn(async move {
                loop {
                    let idx = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(world) = worlds.get(idx) else {
                        break;
                    };
                    let price = lowest_ask(market.as_ref(), item_id, world, timeout).await;
                    if tx.send((idx, price)).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        // Single writer. Worlds whose worker died stay `None`.
        let mut prices: Vec<Option<u64>> = vec![None; worlds.len()];
        while let Some((idx, price)) = rx.recv().await {
            prices[idx] = price;
        }

        let mut results: Vec<ArbitrageResult> = worlds
            .iter()
            .zip(prices)
            .map(|(world, lowest_price)| ArbitrageResult {
                world: world.clone(),
                lowest_price,
            })
            .collect();
        results.sort_by(|a, b| match (a.lowest_price, b.lowest_price) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.world.cmp(&b.world)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.world.cmp(&b.world),
        });

        let priced: Vec<f64> = results
            .iter()
            .filter_map(|r| r.lowest_price.map(|p| p as f64))
            .collect();
        let report = ArbitrageReport {
            item_id,
            median: median(&priced),
            results,
        };

        info!(
            item_id,
            worlds = worlds.len(),
            priced = priced.len(),
            workers,
            cheapest = ?report.cheapest().map(|r| r.world.as_str()),
            "Arbitrage scan complete"
        );
        report
    }
}

async fn lowest_ask(
    market: &dyn MarketDataPort,
    item_id: ItemId,
    world: &str,
    timeout: Duration,
) -> Option<u64> {
    match tokio::time::timeout(timeout, market.fetch(item_id, world)).await {
        Ok(Ok(snapshot)) => {
            let lowest = snapshot.lowest_price();
            debug!(item_id, world = %world, lowest = ?lowest, "World scanned");
            lowest
        }
        Ok(Err(e)) => {
            warn!(item_id, world = %world, error = %e, "World fetch failed");
            None
        }
        Err(_) => {
            warn!(
                item_id,
                world = %world,
                timeout_ms = timeout.as_millis() as u64,
                "World fetch timed out"
            );
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
