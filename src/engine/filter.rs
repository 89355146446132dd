//! Threshold filter for candidates.

use tracing::trace;

use crate::types::{AdviceQuery, ItemMetrics};

/// Applies the user's minimums to computed metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateFilter;

impl CandidateFilter {
    /// True when every threshold in `query` is met.
    pub fn matches(metrics: &ItemMetrics, query: &AdviceQuery) -> bool {
        let pass = metrics.roi >= query.roi_min
            && metrics.sales_per_day >= query.min_sales_per_day
            && metrics.lowest_price >= query.min_price
            && metrics.history_count >= query.min_history;

        if !pass {
            trace!(item_id = metrics.item_id, "Filtered out");
        }
        pass
    }
}
