//! Advice requests end to end: catalog → fetch → rank → fallback.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use broker::config::AdviceConfig;
use broker::engine::{AdviceEngine, ScoringPolicy};
use broker::market::cache::CachedMarketData;
use broker::market::catalog::StaticCatalog;
use broker::types::*;

use crate::mock_market::{MockCatalog, MockMarket};

const WORLD: &str = "Phoenix";

fn engine_over(market: MockMarket, ids: Vec<ItemId>) -> AdviceEngine {
    AdviceEngine::new(
        Arc::new(market),
        Arc::new(StaticCatalog::new(ids)),
        ScoringPolicy::default(),
        &AdviceConfig::default(),
    )
}

fn query() -> AdviceQuery {
    AdviceQuery {
        limit: 20,
        max_candidates: 50,
        ..AdviceQuery::for_world(WORLD)
    }
}

fn ids(resp: &AdviceResponse) -> Vec<ItemId> {
    resp.items.iter().map(|c| c.metrics.item_id).collect()
}

#[tokio::test]
async fn test_unreachable_roi_falls_back_to_relaxed_filters() {
    // Best ROI on offer is 0.5.
    let market = MockMarket::new()
        .with_item(WORLD, 1, 100, 150, 6)
        .with_item(WORLD, 2, 200, 260, 6)
        .with_item(WORLD, 3, 100, 90, 6);
    let engine = engine_over(market, vec![1, 2, 3]);

    let q = AdviceQuery {
        roi_min: 0.9,
        ..query()
    };
    let resp = engine.advise(&q).await.unwrap();

    assert_eq!(resp.fallback_level, Some(FallbackLevel::FilterRelaxed));
    // Item 3 loses money and stays below the relaxed 5% floor.
    assert_eq!(ids(&resp), vec![1, 2]);
    assert_eq!(resp.scanned, 3);
}

#[tokio::test]
async fn test_thin_margins_only_surface_when_exploring() {
    // Both below the relaxed 5% floor, item 3 loses money.
    let market = MockMarket::new()
        .with_item(WORLD, 1, 100, 102, 6)
        .with_item(WORLD, 2, 100, 103, 6)
        .with_item(WORLD, 3, 100, 80, 6);
    let engine = engine_over(market, vec![1, 2, 3]);

    let q = AdviceQuery {
        roi_min: 0.9,
        ..query()
    };
    let resp = engine.advise(&q).await.unwrap();
    assert_eq!(resp.fallback_level, Some(FallbackLevel::Exploratory));
    assert_eq!(ids(&resp), vec![2, 1]);
    assert_eq!(resp.scanned, 3);
}

#[tokio::test]
async fn test_no_measurable_items_is_empty_not_error() {
    let market = MockMarket::new()
        .with_unsold_item(WORLD, 1, 100)
        .with_unsold_item(WORLD, 2, 300);
    let engine = engine_over(market, vec![1, 2, 3]);

    let q = AdviceQuery {
        roi_min: 0.9,
        ..query()
    };
    let resp = engine.advise(&q).await.unwrap();
    assert!(resp.is_empty());
    assert_eq!(resp.scanned, 0);
    assert_eq!(resp.fallback_level, None);
}

#[tokio::test]
async fn test_expert_mode_returns_strict_result() {
    let market = MockMarket::new().with_item(WORLD, 1, 100, 150, 6);
    let engine = engine_over(market.clone(), vec![1]);

    let q = AdviceQuery {
        roi_min: 0.9,
        expert_mode: true,
        ..query()
    };
    let resp = engine.advise(&q).await.unwrap();
    assert!(resp.is_empty());
    assert_eq!(resp.scanned, 1);
    assert_eq!(market.fetch_count(), 1);
}

#[tokio::test]
async fn test_ties_order_by_item_id_across_runs() {
    let mut market = MockMarket::new();
    for id in [42, 7, 19, 3, 28] {
        market = market.with_item(WORLD, id, 100, 140, 6);
    }
    let engine = engine_over(market, vec![42, 7, 19, 3, 28]);

    for _ in 0..5 {
        let resp = engine.advise(&query()).await.unwrap();
        assert_eq!(ids(&resp), vec![3, 7, 19, 28, 42]);
    }
}

#[tokio::test]
async fn test_pages_scan_disjoint_universes() {
    let mut market = MockMarket::new();
    for id in 1..=100 {
        market = market.with_item(WORLD, id, 100, 100 + id as u64, 6);
    }
    let engine = engine_over(market.clone(), (1..=100).collect());

    let first = AdviceQuery {
        limit: 50,
        max_candidates: 50,
        offset: 0,
        ..query()
    };
    let resp_a = engine.advise(&first).await.unwrap();
    let fetched_a: HashSet<_> = market.fetched_items().into_iter().collect();
    market.reset_log();

    let second = AdviceQuery {
        offset: 50,
        ..first.clone()
    };
    let resp_b = engine.advise(&second).await.unwrap();
    let fetched_b: HashSet<_> = market.fetched_items().into_iter().collect();

    assert_eq!(fetched_a.len(), 50);
    assert_eq!(fetched_b.len(), 50);
    assert!(fetched_a.is_disjoint(&fetched_b));

    let a: HashSet<_> = ids(&resp_a).into_iter().collect();
    let b: HashSet<_> = ids(&resp_b).into_iter().collect();
    assert_eq!(a.len(), 50);
    assert!(a.is_disjoint(&b));
}

#[tokio::test]
async fn test_unavailable_items_are_skipped() {
    let market = MockMarket::new().with_item(WORLD, 1, 100, 150, 6);
    market.set_error("provider down");
    let engine = engine_over(market.clone(), vec![1]);

    let resp = engine.advise(&query()).await.unwrap();
    assert!(resp.is_empty());
    assert_eq!(resp.scanned, 0);

    market.clear_error();
    let resp = engine.advise(&query()).await.unwrap();
    assert_eq!(ids(&resp), vec![1]);
}

#[tokio::test]
async fn test_catalog_failure_fails_request() {
    let catalog = MockCatalog::new(vec![1, 2]);
    catalog.set_failing(true);
    let market = MockMarket::new().with_item(WORLD, 1, 100, 150, 6);
    let engine = AdviceEngine::new(
        Arc::new(market.clone()),
        Arc::new(catalog),
        ScoringPolicy::default(),
        &AdviceConfig::default(),
    );

    let err = engine.advise(&query()).await.unwrap_err();
    assert!(matches!(err, BrokerError::Catalog(_)));
    assert_eq!(market.fetch_count(), 0);
}

#[tokio::test]
async fn test_invalid_query_fetches_nothing() {
    let market = MockMarket::new().with_item(WORLD, 1, 100, 150, 6);
    let engine = engine_over(market.clone(), vec![1]);

    let q = AdviceQuery {
        limit: 100,
        max_candidates: 10,
        ..query()
    };
    assert!(matches!(
        engine.advise(&q).await,
        Err(BrokerError::InvalidQuery(_))
    ));
    assert_eq!(market.fetch_count(), 0);
}

#[tokio::test]
async fn test_cached_market_serves_repeat_requests() {
    let market = MockMarket::new()
        .with_item(WORLD, 1, 100, 150, 6)
        .with_item(WORLD, 2, 100, 130, 6);
    let cache = Arc::new(CachedMarketData::new(
        market.clone(),
        Duration::from_secs(600),
        Duration::from_secs(43_200),
    ));
    let engine = AdviceEngine::new(
        cache.clone(),
        Arc::new(MockCatalog::new(vec![1, 2])),
        ScoringPolicy::default(),
        &AdviceConfig::default(),
    );

    let first = engine.advise(&query()).await.unwrap();
    let second = engine.advise(&query()).await.unwrap();
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(market.fetch_count(), 2);
    assert_eq!(cache.hits(), 2);
    assert_eq!(second.items[0].name.as_deref(), Some("Item #1"));
}
