//! Universalis market-board integration.
//!
//! Fetches current listings and recent sale history per item and world,
//! and the list of marketable item ids used to seed the catalog.
//!
//! API docs: https://docs.universalis.app/
//! Base URL: https://universalis.app/api
//! Auth: Not required.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::MarketDataPort;
use crate::config::UniversalisConfig;
use crate::types::{BrokerError, ItemId, Listing, MarketSnapshot, Sale};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// First retry delay; doubles per attempt.
const BACKOFF_BASE_MS: u64 = 200;

/// Upper bound on a single retry delay.
const BACKOFF_MAX_MS: u64 = 3_000;

// ---------------------------------------------------------------------------
// API response types (Universalis JSON → Rust)
// ---------------------------------------------------------------------------

/// Single-item, single-world view from `/v2/{world}/{item}`.
/// We only deserialize the fields we need.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentlyShownView {
    #[serde(rename = "itemID", default)]
    item_id: Option<u32>,
    #[serde(default)]
    listings: Vec<ListingView>,
    #[serde(default)]
    recent_history: Vec<SaleView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingView {
    price_per_unit: u64,
    #[serde(default = "one")]
    quantity: u32,
    #[serde(default)]
    hq: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaleView {
    price_per_unit: u64,
    #[serde(default = "one")]
    quantity: u32,
    /// Seconds since epoch.
    timestamp: i64,
    #[serde(default)]
    hq: bool,
}

fn one() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Outcome of a single HTTP attempt.
enum Attempt<T> {
    Done(T),
    /// Transient failure worth another try.
    Retry(String),
    Fail(BrokerError),
}

/// Universalis market-board client.
pub struct UniversalisClient {
    http: Client,
    base_url: String,
    retry_max: u32,
}

impl UniversalisClient {
    /// Create a new client from config.
    pub fn new(cfg: &UniversalisConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(cfg.user_agent.clone())
            .build()
            .context("Failed to build HTTP client for Universalis")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            retry_max: cfg.retry_max.max(1),
        })
    }

    fn item_url(&self, item_id: ItemId, world: &str) -> String {
        format!(
            "{}/v2/{}/{}",
            self.base_url,
            urlencoding::encode(world),
            item_id
        )
    }

    /// All item ids that can be traded on the market board, ascending.
    pub async fn marketable_items(&self) -> Result<Vec<ItemId>> {
        let url = format!("{}/v2/marketable", self.base_url);
        debug!(url = %url, "Fetching marketable items");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Universalis marketable request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Universalis API error {status}: {body}");
        }

        let mut ids: Vec<ItemId> = resp
            .json()
            .await
            .context("Failed to parse Universalis marketable response")?;
        ids.sort_unstable();
        ids.dedup();

        info!(count = ids.len(), "Marketable items loaded");
        Ok(ids)
    }

    async fn try_fetch(&self, item_id: ItemId, world: &str) -> Attempt<CurrentlyShownView> {
        let url = self.item_url(item_id, world);
        debug!(url = %url, "Fetching Universalis item");

        let resp = match self.http.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() || e.is_connect() => return Attempt::Retry(e.to_string()),
            Err(e) => return Attempt::Fail(unavailable(item_id, world, e.to_string())),
        };

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Attempt::Fail(BrokerError::NotFound {
                item_id,
                world: world.to_string(),
            });
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retry(format!("HTTP {status}"));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Attempt::Fail(unavailable(item_id, world, format!("HTTP {status}: {body}")));
        }

        match resp.json::<CurrentlyShownView>().await {
            Ok(view) => Attempt::Done(view),
            Err(e) => Attempt::Fail(unavailable(
                item_id,
                world,
                format!("failed to parse response: {e}"),
            )),
        }
    }

    fn backoff(attempt: u32) -> Duration {
        let ms = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.min(16));
        Duration::from_millis(ms.min(BACKOFF_MAX_MS))
    }

    /// Convert the API view to a `MarketSnapshot`, dropping malformed rows.
    fn to_snapshot(item_id: ItemId, world: &str, view: CurrentlyShownView) -> MarketSnapshot {
        if let Some(id) = view.item_id {
            if id != item_id {
                warn!(requested = item_id, returned = id, "Universalis returned a different item id");
            }
        }

        let listings = view
            .listings
            .into_iter()
            .filter(|l| l.price_per_unit > 0 && l.quantity > 0)
            .map(|l| Listing {
                price_per_unit: l.price_per_unit,
                quantity: l.quantity,
                is_high_quality: l.hq,
            })
            .collect();

        let history = view
            .recent_history
            .into_iter()
            .filter(|s| s.price_per_unit > 0)
            .filter_map(|s| {
                Some(Sale {
                    timestamp: secs_to_datetime(s.timestamp)?,
                    price_per_unit: s.price_per_unit,
                    quantity: s.quantity.max(1),
                    is_high_quality: s.hq,
                })
            })
            .collect();

        MarketSnapshot::new(item_id, world, listings, history)
    }
}

fn unavailable(item_id: ItemId, world: &str, message: String) -> BrokerError {
    BrokerError::Unavailable {
        item_id,
        world: world.to_string(),
        message,
    }
}

fn secs_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

// ---------------------------------------------------------------------------
// MarketDataPort trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketDataPort for UniversalisClient {
    async fn fetch(&self, item_id: ItemId, world: &str) -> Result<MarketSnapshot, BrokerError> {
        let mut last_error = String::new();

        for attempt in 0..self.retry_max {
            if attempt > 0 {
                tokio::time::sleep(Self::backoff(attempt - 1)).await;
            }
            match self.try_fetch(item_id, world).await {
                Attempt::Done(view) => {
                    let snapshot = Self::to_snapshot(item_id, world, view);
                    debug!(
                        world = %world,
                        item_id,
                        listings = snapshot.listings.len(),
                        history = snapshot.recent_history.len(),
                        "Universalis item fetched"
                    );
                    return Ok(snapshot);
                }
                Attempt::Retry(reason) => {
                    debug!(item_id, world = %world, attempt, reason = %reason, "Transient Universalis error");
                    last_error = reason;
                }
                Attempt::Fail(e) => return Err(e),
            }
        }

        warn!(item_id, world = %world, error = %last_error, "Universalis retries exhausted");
        Err(unavailable(item_id, world, last_error))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
