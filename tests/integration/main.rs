//! End-to-end tests over an in-memory market.

mod advice_flow;
mod arbitrage_scan;
mod mock_market;
