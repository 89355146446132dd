//! Cross-world scans end to end over configured data centers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use broker::config::AppConfig;
use broker::engine::ArbitrageScanner;

use crate::mock_market::MockMarket;

const ITEM: u32 = 5057;

fn scanner(market: &MockMarket) -> ArbitrageScanner {
    ArbitrageScanner::new(Arc::new(market.clone()), Duration::from_secs(5))
}

fn names(worlds: &[&str]) -> Vec<String> {
    worlds.iter().map(|w| w.to_string()).collect()
}

#[tokio::test]
async fn test_three_world_example() {
    let market = MockMarket::new()
        .with_item("A", ITEM, 100, 100, 1)
        .with_item("C", ITEM, 300, 300, 1);

    let report = scanner(&market)
        .scan(ITEM, &names(&["A", "B", "C"]), 3)
        .await;

    let order: Vec<_> = report
        .results
        .iter()
        .map(|r| (r.world.as_str(), r.lowest_price))
        .collect();
    assert_eq!(order, vec![("A", Some(100)), ("C", Some(300)), ("B", None)]);
    assert_eq!(report.median, Some(200.0));
    assert_eq!(report.deviation("A"), Some(-0.5));
    assert_eq!(report.deviation("C"), Some(0.5));
    assert_eq!(report.cheapest().map(|r| r.world.as_str()), Some("A"));
}

#[tokio::test]
async fn test_data_center_scan_fetches_each_world_once() {
    let cfg = AppConfig::from_toml(
        r#"
        [worlds.data_centers]
        Light = ["Alpha", "Lich", "Odin", "Phoenix", "Raiden", "Shiva", "Twintania", "Zodiark"]
        "#,
    )
    .unwrap();
    let worlds = cfg.worlds.worlds_in("Light").unwrap();

    let mut market = MockMarket::new();
    for (i, world) in worlds.iter().enumerate() {
        market = market.with_item(world, ITEM, 1_000 + 10 * i as u64, 1_000, 1);
    }

    for concurrency in [1, 3, 8] {
        market.reset_log();
        let report = scanner(&market).scan(ITEM, &worlds, concurrency).await;

        let fetched = market.fetched_worlds();
        let unique: HashSet<_> = fetched.iter().cloned().collect();
        assert_eq!(fetched.len(), worlds.len(), "concurrency {concurrency}");
        assert_eq!(unique.len(), worlds.len(), "concurrency {concurrency}");

        assert_eq!(report.results.len(), 8);
        assert_eq!(report.results[0].world, "Alpha");
        assert_eq!(report.results[7].world, "Zodiark");
        // Prices 1000..1070: median of an even count is the mean of the middle two.
        assert_eq!(report.median, Some(1_035.0));
    }
}

#[tokio::test]
async fn test_provider_outage_yields_unpriced_worlds() {
    let market = MockMarket::new().with_item("Phoenix", ITEM, 100, 100, 1);
    market.set_error("maintenance");

    let report = scanner(&market)
        .scan(ITEM, &names(&["Phoenix", "Shiva"]), 2)
        .await;
    assert_eq!(report.results.len(), 2);
    assert!(report.results.iter().all(|r| r.lowest_price.is_none()));
    assert_eq!(report.median, None);
    assert_eq!(report.deviation("Phoenix"), None);
}
