//! BROKER: marketplace trading-opportunity advisor
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the market client, cache and item catalog, and serves the JSON
//! API until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use broker::api::{self, ApiState};
use broker::config::AppConfig;
use broker::market::cache::CachedMarketData;
use broker::market::catalog::{load_names, StaticCatalog};
use broker::market::universalis::UniversalisClient;
use broker::market::MarketDataPort;

const BANNER: &str = r#"
 ____  ____   ___  _  _______ ____
| __ )|  _ \ / _ \| |/ / ____|  _ \
|  _ \| |_) | | | | ' /|  _| | |_) |
| |_) |  _ <| |_| | . \| |___|  _ <
|____/|_| \_\\___/|_|\_\_____|_| \_\

  Market-board advisor & cross-world arbitrage
  v0.1.0
"#;

/// How often expired cache entries are swept.
const EVICT_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("BROKER_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = AppConfig::load_or_default(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        provider = %cfg.universalis.base_url,
        cache = cfg.cache.enabled,
        data_centers = cfg.worlds.data_centers.len(),
        "BROKER starting up"
    );

    // -- Market data -----------------------------------------------------

    let client = UniversalisClient::new(&cfg.universalis)?;
    let catalog = build_catalog(&cfg, &client).await?;

    let market: Arc<dyn MarketDataPort> = if cfg.cache.enabled {
        let cache = Arc::new(CachedMarketData::new(
            client,
            cfg.cache.ttl_short(),
            cfg.cache.ttl_long(),
        ));
        spawn_evictor(Arc::clone(&cache));
        cache
    } else {
        warn!("Response cache disabled, every request hits the provider");
        Arc::new(client)
    };

    // -- API -------------------------------------------------------------

    let state = Arc::new(ApiState::new(market, Arc::new(catalog), &cfg));

    info!("Serving. Press Ctrl+C to stop.");
    api::serve(state, &cfg.server.host, cfg.server.port, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("Shutdown signal received");
    })
    .await?;

    info!("BROKER stopped");
    Ok(())
}

/// Candidate universe from config, or the provider's marketable list.
async fn build_catalog(cfg: &AppConfig, client: &UniversalisClient) -> Result<StaticCatalog> {
    let ids = if cfg.catalog.item_ids.is_empty() {
        client
            .marketable_items()
            .await
            .context("Failed to load the item catalog")?
    } else {
        cfg.catalog.item_ids.clone()
    };

    let names = match cfg.catalog.bootstrap_path.as_deref() {
        Some(path) => load_names(path)?,
        None => Default::default(),
    };

    let catalog = StaticCatalog::new(ids).with_names(names);
    info!(
        items = catalog.len(),
        names = catalog.names_count(),
        "Item catalog ready"
    );
    Ok(catalog)
}

fn spawn_evictor(cache: Arc<CachedMarketData<UniversalisClient>>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICT_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = cache.evict_expired().await;
            let remaining = cache.len().await;
            info!(
                evicted,
                remaining,
                hit_rate = %format!("{:.2}", cache.hit_rate()),
                "Cache sweep"
            );
        }
    });
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("broker=info"));

    let json_logging = std::env::var("BROKER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
