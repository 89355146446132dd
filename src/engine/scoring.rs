//! Opportunity scoring.
//!
//! Turns `ItemMetrics` into a ranking score plus qualitative risk flags.
//! The score rises strictly with both ROI and sales velocity; flags that
//! only fire at low velocity fall away as velocity grows, so penalties
//! never invert that ordering.

use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::debug;

use crate::types::{ItemMetrics, RiskFlag, RiskLevel};

// ---------------------------------------------------------------------------
// Configuration (defaults, overridden by config.toml at runtime)
// ---------------------------------------------------------------------------

/// Weights and thresholds for scoring and flagging.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight of ROI in the score.
    pub w_roi: f64,
    /// Weight of the liquidity term in the score.
    pub w_spd: f64,
    /// Sales/day at which the liquidity term reaches ~63% of its maximum.
    pub spd_norm: f64,

    /// ROI at or above which an item is a flip candidate.
    pub flip_roi: f64,
    /// Sales/day required for a flip.
    pub flip_min_sales_per_day: f64,

    /// Listings per daily sale above which the market is saturated.
    pub saturation_mult: f64,
    /// Minimum history before saturation is judged.
    pub saturation_min_history: usize,

    /// Sales/day below which an item is illiquid.
    pub illiquid_below: f64,
    /// Price coefficient of variation at or above which an item is volatile.
    pub volatile_cv: f64,

    /// ROI at or above which a thin history is suspicious.
    pub suspect_roi: f64,
    /// Per-unit profit at or above which a volatile item is suspicious.
    pub suspect_abs_profit: f64,
    /// History length below which extreme ROI is not trusted.
    pub min_sales_safe: usize,

    pub penalty_saturo: f64,
    pub penalty_volatile: f64,
    pub penalty_illiquid: f64,

    /// Scores below this are high risk.
    pub risk_low: f64,
    /// Scores below this (and above `risk_low`) are medium risk.
    pub risk_med: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            w_roi: 0.7,
            w_spd: 0.5,
            spd_norm: 10.0,
            flip_roi: 0.4,
            flip_min_sales_per_day: 1.0,
            saturation_mult: 5.0,
            saturation_min_history: 5,
            illiquid_below: 0.5,
            volatile_cv: 0.5,
            suspect_roi: 10.0,
            suspect_abs_profit: 200_000.0,
            min_sales_safe: 5,
            penalty_saturo: 0.2,
            penalty_volatile: 0.2,
            penalty_illiquid: 0.1,
            risk_low: 0.3,
            risk_med: 0.6,
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Deterministic scoring of item metrics.
#[derive(Debug, Clone, Default)]
pub struct ScoringPolicy {
    config: ScoringConfig,
}

impl ScoringPolicy {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score and flag one item.
    ///
    /// `score = w_roi·roi + w_spd·(1 − e^(−spd/spd_norm)) − penalties`
    pub fn score(&self, metrics: &ItemMetrics) -> (f64, BTreeSet<RiskFlag>) {
        let flags = self.flags(metrics);
        let c = &self.config;

        let liquidity = 1.0 - (-metrics.sales_per_day / c.spd_norm.max(f64::EPSILON)).exp();
        let mut score = c.w_roi * metrics.roi + c.w_spd * liquidity;

        for flag in &flags {
            score -= match flag {
                RiskFlag::Saturo => c.penalty_saturo,
                RiskFlag::Volatile => c.penalty_volatile,
                RiskFlag::Illiquid => c.penalty_illiquid,
                RiskFlag::Flip | RiskFlag::Suspect => 0.0,
            };
        }

        debug!(
            item_id = metrics.item_id,
            roi = %format!("{:.3}", metrics.roi),
            spd = %format!("{:.2}", metrics.sales_per_day),
            score = %format!("{:.3}", score),
            flags = ?flags,
            "Item scored"
        );

        (score, flags)
    }

    /// Qualitative flags for one item.
    pub fn flags(&self, m: &ItemMetrics) -> BTreeSet<RiskFlag> {
        let c = &self.config;
        let mut flags = BTreeSet::new();

        if m.roi >= c.flip_roi && m.sales_per_day >= c.flip_min_sales_per_day {
            flags.insert(RiskFlag::Flip);
        }

        if m.history_count >= c.saturation_min_history
            && m.active_listings as f64 > c.saturation_mult * m.sales_per_day
        {
            flags.insert(RiskFlag::Saturo);
        }

        if m.sales_per_day < c.illiquid_below {
            flags.insert(RiskFlag::Illiquid);
        }

        let volatile = m.price_cv >= c.volatile_cv;
        if volatile {
            flags.insert(RiskFlag::Volatile);
        }

        let thin_history_spike = m.roi >= c.suspect_roi && m.history_count < c.min_sales_safe;
        let volatile_windfall = volatile && m.unit_profit() >= c.suspect_abs_profit;
        if thin_history_spike || volatile_windfall {
            flags.insert(RiskFlag::Suspect);
        }

        flags
    }

    /// Risk band for a scored item. Suspicious offers are always high risk.
    pub fn risk(&self, score: f64, flags: &BTreeSet<RiskFlag>) -> RiskLevel {
        if flags.contains(&RiskFlag::Suspect) || score < self.config.risk_low {
            RiskLevel::High
        } else if score < self.config.risk_med {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(roi: f64, spd: f64) -> ItemMetrics {
        ItemMetrics {
            item_id: 1,
            lowest_price: 1_000,
            target_price: 1_000.0 * (1.0 + roi),
            roi,
            sales_per_day: spd,
            history_count: 20,
            active_listings: 3,
            price_cv: 0.1,
        }
    }

    #[test]
    fn test_flip_requires_roi_and_liquidity() {
        let p = ScoringPolicy::default();
        assert!(p.flags(&metrics(0.5, 2.0)).contains(&RiskFlag::Flip));
        assert!(!p.flags(&metrics(0.5, 0.2)).contains(&RiskFlag::Flip));
        assert!(!p.flags(&metrics(0.1, 5.0)).contains(&RiskFlag::Flip));
    }

    #[test]
    fn test_saturation() {
        let p = ScoringPolicy::default();
        let mut m = metrics(0.2, 1.0);
        m.active_listings = 30;
        assert!(p.flags(&m).contains(&RiskFlag::Saturo));

        // Not enough history to judge.
        m.history_count = 2;
        assert!(!p.flags(&m).contains(&RiskFlag::Saturo));

        let mut m = metrics(0.2, 10.0);
        m.active_listings = 30;
        assert!(!p.flags(&m).contains(&RiskFlag::Saturo));
    }

    #[test]
    fn test_illiquid_and_volatile() {
        let p = ScoringPolicy::default();
        let mut m = metrics(0.2, 0.1);
        m.price_cv = 0.9;
        let flags = p.flags(&m);
        assert!(flags.contains(&RiskFlag::Illiquid));
        assert!(flags.contains(&RiskFlag::Volatile));
    }

    #[test]
    fn test_suspect_thin_history() {
        let p = ScoringPolicy::default();
        let mut m = metrics(15.0, 2.0);
        m.history_count = 2;
        let flags = p.flags(&m);
        assert!(flags.contains(&RiskFlag::Suspect));
        let (score, flags) = p.score(&m);
        assert_eq!(p.risk(score, &flags), RiskLevel::High);
    }

    #[test]
    fn test_suspect_volatile_windfall() {
        let p = ScoringPolicy::default();
        let mut m = metrics(1.0, 2.0);
        m.lowest_price = 300_000;
        m.target_price = 600_000.0;
        m.price_cv = 0.8;
        assert!(p.flags(&m).contains(&RiskFlag::Suspect));
    }

    #[test]
    fn test_score_monotonic_in_roi() {
        let p = ScoringPolicy::default();
        let mut prev = f64::NEG_INFINITY;
        for roi in [0.0, 0.05, 0.2, 0.39, 0.4, 1.0, 5.0, 12.0] {
            let (s, _) = p.score(&metrics(roi, 2.0));
            assert!(s > prev, "roi {roi}: {s} <= {prev}");
            prev = s;
        }
    }

    #[test]
    fn test_score_monotonic_in_sales() {
        let p = ScoringPolicy::default();
        let mut prev = f64::NEG_INFINITY;
        for spd in [0.0, 0.1, 0.49, 0.5, 1.0, 3.0, 10.0, 50.0] {
            let mut m = metrics(0.3, spd);
            m.active_listings = 12;
            let (s, _) = p.score(&m);
            assert!(s > prev, "spd {spd}: {s} <= {prev}");
            prev = s;
        }
    }

    #[test]
    fn test_score_deterministic() {
        let p = ScoringPolicy::default();
        let m = metrics(0.37, 4.2);
        assert_eq!(p.score(&m), p.score(&m));
    }

    #[test]
    fn test_risk_bands() {
        let p = ScoringPolicy::default();
        let none = BTreeSet::new();
        assert_eq!(p.risk(0.1, &none), RiskLevel::High);
        assert_eq!(p.risk(0.45, &none), RiskLevel::Medium);
        assert_eq!(p.risk(0.9, &none), RiskLevel::Low);
    }
}
