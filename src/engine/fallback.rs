//! Fallback ladder for queries that match nothing.
//!
//! Each rung is a pure transformation of the caller's original query. The
//! engine tries them in order and stops at the first rung with results.

use crate::types::{AdviceQuery, FallbackLevel, TargetKind};

/// Scan width used once the strict query comes back empty.
pub const WIDE_SCAN: usize = 300;
/// Scan width for the exploratory rung.
pub const EXPLORATORY_SCAN: usize = 1_000;
/// ROI floor for the relaxed rung.
pub const RELAXED_ROI: f64 = 0.05;

impl FallbackLevel {
    /// Escalation order after `Strict`.
    pub const LADDER: [FallbackLevel; 3] = [
        FallbackLevel::ScanWidened,
        FallbackLevel::FilterRelaxed,
        FallbackLevel::Exploratory,
    ];

    /// Broaden `query` for this level. `Strict` returns it unchanged.
    pub fn apply(self, query: &AdviceQuery) -> AdviceQuery {
        match self {
            FallbackLevel::Strict => query.clone(),
            FallbackLevel::ScanWidened => widen_scan(query),
            FallbackLevel::FilterRelaxed => relax_filters(query),
            FallbackLevel::Exploratory => explore(query),
        }
    }
}

fn widen_scan(query: &AdviceQuery) -> AdviceQuery {
    AdviceQuery {
        max_candidates: query.max_candidates.max(WIDE_SCAN),
        ..query.clone()
    }
}

fn relax_filters(query: &AdviceQuery) -> AdviceQuery {
    let widened = widen_scan(query);
    AdviceQuery {
        roi_min: widened.roi_min.min(RELAXED_ROI),
        min_sales_per_day: widened.min_sales_per_day / 2.0,
        min_price: widened.min_price / 2,
        min_history: widened.min_history / 2,
        target: TargetKind::Avg,
        quantile: None,
        ..widened
    }
}

fn explore(query: &AdviceQuery) -> AdviceQuery {
    AdviceQuery {
        roi_min: 0.0,
        min_sales_per_day: 0.0,
        min_price: 0,
        min_history: 0,
        target: TargetKind::Avg,
        quantile: None,
        max_candidates: query.max_candidates.max(EXPLORATORY_SCAN),
        ..query.clone()
    }
}

/// Produces the broadened queries to try after an empty strict result.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackBroadener;

impl FallbackBroadener {
    /// The ladder's queries in order, paired with their level.
    ///
    /// A rung that would repeat `query` or an earlier rung is dropped, so
    /// every returned query is strictly broader than the one tried before.
    pub fn ladder(query: &AdviceQuery) -> Vec<(FallbackLevel, AdviceQuery)> {
        let mut rungs: Vec<(FallbackLevel, AdviceQuery)> = Vec::new();
        for level in FallbackLevel::LADDER {
            let broadened = level.apply(query);
            let repeats = broadened == *query || rungs.iter().any(|(_, q)| *q == broadened);
            if !repeats {
                rungs.push((level, broadened));
            }
        }
        rungs
    }
}
