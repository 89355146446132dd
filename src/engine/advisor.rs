//! Advice engine.
//!
//! Pulls a page of candidates from the catalog, fetches each snapshot with
//! bounded concurrency, computes and scores metrics, filters on the
//! caller's thresholds and ranks the survivors. When a non-expert query
//! finds nothing, the fallback ladder is walked until a level produces
//! results.

use futures::stream::{self, StreamExt};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::fallback::FallbackBroadener;
use super::filter::CandidateFilter;
use super::metrics::MetricsCalculator;
use super::scoring::ScoringPolicy;
use crate::config::AdviceConfig;
use crate::market::{ItemCatalog, MarketDataPort};
use crate::types::{
    AdviceQuery, AdviceResponse, BrokerError, FallbackLevel, ItemId, ItemMetrics, ScoredCandidate,
    TargetEstimator,
};

/// Result of running one query at one level.
struct Pass {
    items: Vec<ScoredCandidate>,
    scanned: usize,
}

/// Orchestrates catalog → fetch → metrics → scoring → filter → ranking.
pub struct AdviceEngine {
    market: Arc<dyn MarketDataPort>,
    catalog: Arc<dyn ItemCatalog>,
    calculator: MetricsCalculator,
    scoring: ScoringPolicy,
    fetch_concurrency: usize,
    fetch_timeout: Duration,
}

impl AdviceEngine {
    pub fn new(
        market: Arc<dyn MarketDataPort>,
        catalog: Arc<dyn ItemCatalog>,
        scoring: ScoringPolicy,
        config: &AdviceConfig,
    ) -> Self {
        Self {
            market,
            catalog,
            calculator: MetricsCalculator::new(),
            scoring,
            fetch_concurrency: config.fetch_concurrency.max(1),
            fetch_timeout: config.fetch_timeout(),
        }
    }

    pub fn scoring(&self) -> &ScoringPolicy {
        &self.scoring
    }

    /// Ranked opportunities for `query`.
    ///
    /// Fails only on an invalid query or a catalog failure; items that
    /// cannot be fetched or measured are skipped.
    pub async fn advise(&self, query: &AdviceQuery) -> Result<AdviceResponse, BrokerError> {
        query.validate()?;

        let strict = self.run(query).await?;
        if !strict.items.is_empty() {
            return Ok(self.respond(query, strict, Some(FallbackLevel::Strict)));
        }
        if query.expert_mode {
            info!(world = %query.world, scanned = strict.scanned, "No matches (expert mode)");
            return Ok(self.respond(query, strict, None));
        }

        let mut last = strict;
        for (level, broadened) in FallbackBroadener::ladder(query) {
            debug!(world = %query.world, level = %level, "Broadening query");
            let pass = self.run(&broadened).await?;
            if !pass.items.is_empty() {
                return Ok(self.respond(query, pass, Some(level)));
            }
            last = pass;
        }

        info!(world = %query.world, scanned = last.scanned, "No matches at any fallback level");
        Ok(self.respond(query, last, None))
    }

    fn respond(
        &self,
        query: &AdviceQuery,
        pass: Pass,
        fallback_level: Option<FallbackLevel>,
    ) -> AdviceResponse {
        if let Some(level) = fallback_level {
            info!(
                world = %query.world,
                count = pass.items.len(),
                scanned = pass.scanned,
                level = %level,
                "Advice ready"
            );
        }
        AdviceResponse {
            world: query.world.clone(),
            items: pass.items,
            scanned: pass.scanned,
            fallback_level,
        }
    }

    /// One level: scan, filter, rank and truncate.
    async fn run(&self, query: &AdviceQuery) -> Result<Pass, BrokerError> {
        let estimator = query.estimator()?;
        let ids = self
            .catalog
            .candidates(query.offset, query.max_candidates)
            .await?;

        let measured = self.measure(&ids, &query.world, estimator).await;
        let scanned = measured.len();

        let mut items = Vec::new();
        for metrics in measured {
            if !CandidateFilter::matches(&metrics, query) {
                continue;
            }
            let (score, flags) = self.scoring.score(&metrics);
            let risk = self.scoring.risk(score, &flags);
            let name = self.catalog.name(metrics.item_id).await;
            items.push(ScoredCandidate {
                metrics,
                score,
                flags,
                risk,
                name,
            });
        }

        items.sort_by(rank);
        items.truncate(query.limit);

        debug!(
            world = %query.world,
            candidates = ids.len(),
            scanned,
            kept = items.len(),
            "Scan pass complete"
        );
        Ok(Pass { items, scanned })
    }

    /// Fetch and measure every id, preserving catalog order.
    async fn measure(
        &self,
        ids: &[ItemId],
        world: &str,
        estimator: TargetEstimator,
    ) -> Vec<ItemMetrics> {
        stream::iter(ids.iter().copied())
            .map(|item_id| self.measure_one(item_id, world, estimator))
            .buffered(self.fetch_concurrency)
            .filter_map(|m| async move { m })
            .collect()
            .await
    }

    async fn measure_one(
        &self,
        item_id: ItemId,
        world: &str,
        estimator: TargetEstimator,
    ) -> Option<ItemMetrics> {
        let snapshot = match tokio::time::timeout(
            self.fetch_timeout,
            self.market.fetch(item_id, world),
        )
        .await
        {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e @ BrokerError::NotFound { .. })) => {
                debug!(item_id, world = %world, error = %e, "Skipping item");
                return None;
            }
            Ok(Err(e)) => {
                warn!(item_id, world = %world, error = %e, "Fetch failed, skipping item");
                return None;
            }
            Err(_) => {
                warn!(
                    item_id,
                    world = %world,
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "Fetch timed out, skipping item"
                );
                return None;
            }
        };

        match self.calculator.compute(&snapshot, estimator) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                debug!(item_id, world = %world, error = %e, "Skipping item");
                None
            }
        }
    }
}

/// Score desc, then sales/day desc, then item id asc.
fn rank(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.metrics.sales_per_day.total_cmp(&a.metrics.sales_per_day))
        .then_with(|| a.metrics.item_id.cmp(&b.metrics.item_id))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
