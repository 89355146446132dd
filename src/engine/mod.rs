//! Core engine: snapshot → metrics → score → filter → rank, plus the
//! cross-world arbitrage scan.

pub mod advisor;
pub mod arbitrage;
pub mod fallback;
pub mod filter;
pub mod metrics;
pub mod scoring;

pub use advisor::AdviceEngine;
pub use arbitrage::ArbitrageScanner;
pub use fallback::FallbackBroadener;
pub use filter::CandidateFilter;
pub use metrics::MetricsCalculator;
pub use scoring::{ScoringConfig, ScoringPolicy};
