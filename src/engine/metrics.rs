//! Per-item metrics.
//!
//! Derives lowest ask, target resale price, ROI and sales velocity from a
//! single market snapshot. Pure functions, no I/O.

use crate::types::{BrokerError, ItemMetrics, MarketSnapshot, Sale, TargetEstimator};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Smallest history span used for velocity (one hour), so a burst of sales
/// sharing a timestamp doesn't divide by zero.
pub const MIN_SPAN_DAYS: f64 = 1.0 / 24.0;

const MS_PER_DAY: f64 = 86_400_000.0;

// ---------------------------------------------------------------------------
// Estimators
// ---------------------------------------------------------------------------

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median of an unsorted slice; even counts average the central pair.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Linear-interpolated order statistic at fraction `q` (position `q·(n−1)`).
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted(values);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Apply an estimator to a set of prices.
pub fn estimate(values: &[f64], estimator: TargetEstimator) -> Option<f64> {
    match estimator {
        TargetEstimator::Avg => mean(values),
        TargetEstimator::Median => median(values),
        TargetEstimator::Quantile(q) => quantile(values, q),
    }
}

/// Population standard deviation over mean; 0 when undefined.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let Some(m) = mean(values) else {
        return 0.0;
    };
    if values.len() < 2 || m == 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt() / m
}

/// Sales per day over the span covered by `history`.
pub fn sales_per_day(history: &[Sale]) -> f64 {
    let (Some(oldest), Some(newest)) = (
        history.iter().map(|s| s.timestamp).min(),
        history.iter().map(|s| s.timestamp).max(),
    ) else {
        return 0.0;
    };
    let span_days = ((newest - oldest).num_milliseconds() as f64 / MS_PER_DAY).max(MIN_SPAN_DAYS);
    history.len() as f64 / span_days
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Turns a market snapshot into `ItemMetrics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCalculator;

impl MetricsCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Compute metrics, failing with `InsufficientData` when the snapshot
    /// has no listings, no history, or a non-positive lowest price.
    pub fn compute(
        &self,
        snapshot: &MarketSnapshot,
        estimator: TargetEstimator,
    ) -> Result<ItemMetrics, BrokerError> {
        let item_id = snapshot.item_id;

        let lowest_price = snapshot
            .lowest_price()
            .ok_or_else(|| BrokerError::insufficient(item_id, "no active listings"))?;
        if lowest_price == 0 {
            return Err(BrokerError::insufficient(item_id, "lowest price is zero"));
        }

        let prices: Vec<f64> = snapshot
            .recent_history
            .iter()
            .map(|s| s.price_per_unit as f64)
            .collect();
        let target_price = estimate(&prices, estimator)
            .ok_or_else(|| BrokerError::insufficient(item_id, "no sale history"))?;

        let lowest = lowest_price as f64;
        Ok(ItemMetrics {
            item_id,
            lowest_price,
            target_price,
            roi: (target_price - lowest) / lowest,
            sales_per_day: sales_per_day(&snapshot.recent_history),
            history_count: snapshot.recent_history.len(),
            active_listings: snapshot.listings.len(),
            price_cv: coefficient_of_variation(&prices),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
