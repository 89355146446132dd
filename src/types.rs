//! Shared types for the BROKER advisor.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that market adapters, the engine
//! and the API can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Numeric item identifier as used by the market-data provider.
pub type ItemId = u32;

// ---------------------------------------------------------------------------
// Market snapshot
// ---------------------------------------------------------------------------

/// A single active listing on the market board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub price_per_unit: u64,
    pub quantity: u32,
    pub is_high_quality: bool,
}

/// A completed sale from the recent history window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub timestamp: DateTime<Utc>,
    pub price_per_unit: u64,
    pub quantity: u32,
    pub is_high_quality: bool,
}

/// Listings and recent sales for one item on one world, as fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub item_id: ItemId,
    pub world: String,
    pub listings: Vec<Listing>,
    /// Sorted by timestamp, most recent last.
    pub recent_history: Vec<Sale>,
}

impl MarketSnapshot {
    /// Build a snapshot, normalising the history order so every
    /// downstream computation sees oldest-first sales.
    pub fn new(
        item_id: ItemId,
        world: impl Into<String>,
        listings: Vec<Listing>,
        mut recent_history: Vec<Sale>,
    ) -> Self {
        recent_history.sort_by_key(|s| s.timestamp);
        Self {
            item_id,
            world: world.into(),
            listings,
            recent_history,
        }
    }

    /// Cheapest asking price, if anything is listed.
    pub fn lowest_price(&self) -> Option<u64> {
        self.listings.iter().map(|l| l.price_per_unit).min()
    }

    /// Total units across all listings.
    pub fn units_listed(&self) -> u64 {
        self.listings.iter().map(|l| l.quantity as u64).sum()
    }

    /// Total units sold across the retained history.
    pub fn units_sold(&self) -> u64 {
        self.recent_history.iter().map(|s| s.quantity as u64).sum()
    }
}

// ---------------------------------------------------------------------------
// Metrics and scoring
// ---------------------------------------------------------------------------

/// Per-item metrics derived from one snapshot. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetrics {
    pub item_id: ItemId,
    pub lowest_price: u64,
    pub target_price: f64,
    /// (target - lowest) / lowest
    pub roi: f64,
    pub sales_per_day: f64,
    pub history_count: usize,
    /// Number of active listings at fetch time.
    pub active_listings: usize,
    /// Coefficient of variation of historical sale prices.
    pub price_cv: f64,
}

impl ItemMetrics {
    /// Expected per-unit profit when buying at the lowest ask and
    /// reselling at the target price.
    pub fn unit_profit(&self) -> f64 {
        self.target_price - self.lowest_price as f64
    }
}

/// Qualitative risk markers attached to a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskFlag {
    /// High ROI with strong liquidity, suitable for immediate resale.
    Flip,
    /// More stock listed than the market absorbs.
    Saturo,
    /// Too few sales to resell reliably.
    Illiquid,
    /// Historical prices are widely dispersed.
    Volatile,
    /// Numbers look too good to be true.
    Suspect,
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskFlag::Flip => write!(f, "flip"),
            RiskFlag::Saturo => write!(f, "saturo"),
            RiskFlag::Illiquid => write!(f, "illiquid"),
            RiskFlag::Volatile => write!(f, "volatile"),
            RiskFlag::Suspect => write!(f, "suspect"),
        }
    }
}

/// Coarse risk band derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// A candidate that survived scoring and filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub metrics: ItemMetrics,
    pub score: f64,
    pub flags: BTreeSet<RiskFlag>,
    pub risk: RiskLevel,
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Advice query
// ---------------------------------------------------------------------------

/// Which estimator produces the target (resale) price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Avg,
    Median,
    Quantile,
}

impl std::str::FromStr for TargetKind {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "avg" | "mean" | "average" => Ok(TargetKind::Avg),
            "median" => Ok(TargetKind::Median),
            "quantile" | "q" => Ok(TargetKind::Quantile),
            other => Err(BrokerError::InvalidQuery(format!("unknown target: {other}"))),
        }
    }
}

/// A validated estimator, with the quantile fraction bound in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetEstimator {
    Avg,
    Median,
    Quantile(f64),
}

/// User-supplied parameters for one advice request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdviceQuery {
    pub world: String,
    pub roi_min: f64,
    pub limit: usize,
    pub min_sales_per_day: f64,
    pub min_price: u64,
    pub min_history: usize,
    pub target: TargetKind,
    pub quantile: Option<f64>,
    pub max_candidates: usize,
    pub offset: usize,
    pub expert_mode: bool,
}

impl Default for AdviceQuery {
    fn default() -> Self {
        Self {
            world: String::new(),
            roi_min: 0.0,
            limit: 50,
            min_sales_per_day: 0.0,
            min_price: 0,
            min_history: 0,
            target: TargetKind::Avg,
            quantile: None,
            max_candidates: 150,
            offset: 0,
            expert_mode: false,
        }
    }
}

impl AdviceQuery {
    /// A query with default thresholds for the given world.
    pub fn for_world(world: impl Into<String>) -> Self {
        Self {
            world: world.into(),
            ..Self::default()
        }
    }

    /// Check the query and return the estimator it names.
    pub fn validate(&self) -> Result<TargetEstimator, BrokerError> {
        if self.world.trim().is_empty() {
            return Err(BrokerError::InvalidQuery("world is required".into()));
        }
        if !(self.roi_min >= 0.0) {
            return Err(BrokerError::InvalidQuery(format!(
                "roi_min must be >= 0, got {}",
                self.roi_min
            )));
        }
        if !(self.min_sales_per_day >= 0.0) {
            return Err(BrokerError::InvalidQuery(format!(
                "min_sales_per_day must be >= 0, got {}",
                self.min_sales_per_day
            )));
        }
        if self.limit == 0 {
            return Err(BrokerError::InvalidQuery("limit must be > 0".into()));
        }
        if self.max_candidates < self.limit {
            return Err(BrokerError::InvalidQuery(format!(
                "max_candidates ({}) must be >= limit ({})",
                self.max_candidates, self.limit
            )));
        }
        self.estimator()
    }

    /// Resolve `target` + `quantile` into an estimator.
    pub fn estimator(&self) -> Result<TargetEstimator, BrokerError> {
        match self.target {
            TargetKind::Avg => Ok(TargetEstimator::Avg),
            TargetKind::Median => Ok(TargetEstimator::Median),
            TargetKind::Quantile => match self.quantile {
                Some(q) if q > 0.0 && q < 1.0 => Ok(TargetEstimator::Quantile(q)),
                Some(q) => Err(BrokerError::InvalidQuery(format!(
                    "quantile must be in (0, 1), got {q}"
                ))),
                None => Err(BrokerError::InvalidQuery(
                    "quantile is required when target=quantile".into(),
                )),
            },
        }
    }
}

/// Escalation stage that produced an advice result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackLevel {
    Strict,
    ScanWidened,
    FilterRelaxed,
    Exploratory,
}

impl fmt::Display for FallbackLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackLevel::Strict => write!(f, "strict"),
            FallbackLevel::ScanWidened => write!(f, "scan_widened"),
            FallbackLevel::FilterRelaxed => write!(f, "filter_relaxed"),
            FallbackLevel::Exploratory => write!(f, "exploratory"),
        }
    }
}

/// Ranked advice for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdviceResponse {
    pub world: String,
    pub items: Vec<ScoredCandidate>,
    /// Items whose snapshot was fetched and whose metrics were computed,
    /// at the level that produced `items`.
    pub scanned: usize,
    /// Level that produced `items`; `None` when nothing was found.
    pub fallback_level: Option<FallbackLevel>,
}

impl AdviceResponse {
    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Arbitrage
// ---------------------------------------------------------------------------

/// Lowest ask for one item on one world. `None` when the world had no
/// data or the fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrageResult {
    pub world: String,
    pub lowest_price: Option<u64>,
}

/// Cross-world comparison for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageReport {
    pub item_id: ItemId,
    /// Ascending by price, worlds without data last.
    pub results: Vec<ArbitrageResult>,
    /// Median over worlds that reported a price.
    pub median: Option<f64>,
}

impl ArbitrageReport {
    /// `(lowest - median) / median` for a world, if both are known.
    pub fn deviation(&self, world: &str) -> Option<f64> {
        self.results
            .iter()
            .find(|r| r.world == world)
            .and_then(|r| self.deviation_of(r))
    }

    pub fn deviation_of(&self, result: &ArbitrageResult) -> Option<f64> {
        let median = self.median?;
        let price = result.lowest_price? as f64;
        if median == 0.0 {
            return None;
        }
        Some((price - median) / median)
    }

    /// The world with the cheapest ask, if any world had data.
    pub fn cheapest(&self) -> Option<&ArbitrageResult> {
        self.results.first().filter(|r| r.lowest_price.is_some())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for BROKER.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Insufficient data for item {item_id}: {reason}")]
    InsufficientData { item_id: ItemId, reason: String },

    #[error("Market data unavailable for item {item_id} on {world}: {message}")]
    Unavailable {
        item_id: ItemId,
        world: String,
        message: String,
    },

    #[error("Item {item_id} has no market on {world}")]
    NotFound { item_id: ItemId, world: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Item catalog error: {0}")]
    Catalog(String),
}

impl BrokerError {
    pub fn insufficient(item_id: ItemId, reason: impl Into<String>) -> Self {
        BrokerError::InsufficientData {
            item_id,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
