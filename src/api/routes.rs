//! JSON API route handlers.
//!
//! State is immutable and shared via `Arc<ApiState>`; each request builds
//! its own query and result.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{AppConfig, ArbitrageConfig, WorldsConfig};
use crate::engine::{AdviceEngine, ArbitrageScanner, MetricsCalculator, ScoringPolicy};
use crate::market::{ItemCatalog, MarketDataPort};
use crate::types::{
    AdviceQuery, AdviceResponse, BrokerError, ItemId, ItemMetrics, RiskFlag, RiskLevel, TargetKind,
};

const SEARCH_DEFAULT_LIMIT: usize = 20;
const SEARCH_MAX_LIMIT: usize = 200;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Services shared by all handlers.
pub struct ApiState {
    pub engine: AdviceEngine,
    pub scanner: ArbitrageScanner,
    pub market: Arc<dyn MarketDataPort>,
    pub catalog: Arc<dyn ItemCatalog>,
    pub calculator: MetricsCalculator,
    pub scoring: ScoringPolicy,
    pub worlds: WorldsConfig,
    pub arbitrage: ArbitrageConfig,
    pub fetch_timeout: Duration,
}

impl ApiState {
    /// Wire the engine and scanner over one market source and catalog.
    pub fn new(
        market: Arc<dyn MarketDataPort>,
        catalog: Arc<dyn ItemCatalog>,
        config: &AppConfig,
    ) -> Self {
        let scoring = ScoringPolicy::new(config.scoring.clone());
        Self {
            engine: AdviceEngine::new(
                Arc::clone(&market),
                Arc::clone(&catalog),
                scoring.clone(),
                &config.advice,
            ),
            scanner: ArbitrageScanner::new(Arc::clone(&market), config.arbitrage.world_timeout()),
            market,
            catalog,
            calculator: MetricsCalculator::new(),
            scoring,
            worlds: config.worlds.clone(),
            arbitrage: config.arbitrage.clone(),
            fetch_timeout: config.advice.fetch_timeout(),
        }
    }

    fn check_world(&self, world: &str) -> Result<(), ApiError> {
        if world.trim().is_empty() {
            return Err(ApiError::BadRequest("world is required".into()));
        }
        if !self.worlds.is_allowed(world) {
            return Err(ApiError::BadRequest(format!("unknown world: {world}")));
        }
        Ok(())
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Broker(BrokerError),
    BadRequest(String),
    NotFound(String),
}

impl From<BrokerError> for ApiError {
    fn from(e: BrokerError) -> Self {
        ApiError::Broker(e)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Broker(e) => {
                let status = match &e {
                    BrokerError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
                    BrokerError::NotFound { .. } => StatusCode::NOT_FOUND,
                    BrokerError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    BrokerError::Unavailable { .. } | BrokerError::Catalog(_) => {
                        StatusCode::BAD_GATEWAY
                    }
                };
                if status.is_server_error() {
                    warn!(error = %e, "Upstream failure");
                }
                (status, e.to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Query string for `/advice`. Missing fields take `AdviceQuery` defaults.
#[derive(Debug, Default, Deserialize)]
pub struct AdviceParams {
    pub world: Option<String>,
    pub roi_min: Option<f64>,
    pub limit: Option<usize>,
    pub min_sales_per_day: Option<f64>,
    pub min_price: Option<u64>,
    pub min_history: Option<usize>,
    pub target: Option<String>,
    pub quantile: Option<f64>,
    pub max_candidates: Option<usize>,
    pub offset: Option<usize>,
    pub expert_mode: Option<bool>,
}

impl AdviceParams {
    pub fn into_query(self) -> Result<AdviceQuery, BrokerError> {
        let d = AdviceQuery::default();
        let target = match self.target.as_deref() {
            Some(t) => t.parse::<TargetKind>()?,
            None => d.target,
        };
        Ok(AdviceQuery {
            world: self.world.unwrap_or_default(),
            roi_min: self.roi_min.unwrap_or(d.roi_min),
            limit: self.limit.unwrap_or(d.limit),
            min_sales_per_day: self.min_sales_per_day.unwrap_or(d.min_sales_per_day),
            min_price: self.min_price.unwrap_or(d.min_price),
            min_history: self.min_history.unwrap_or(d.min_history),
            target,
            quantile: self.quantile,
            max_candidates: self.max_candidates.unwrap_or(d.max_candidates),
            offset: self.offset.unwrap_or(d.offset),
            expert_mode: self.expert_mode.unwrap_or(d.expert_mode),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ItemParams {
    pub world: String,
    pub target: Option<String>,
    pub quantile: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ItemReport {
    pub world: String,
    pub name: Option<String>,
    #[serde(flatten)]
    pub metrics: ItemMetrics,
    pub score: f64,
    pub flags: BTreeSet<RiskFlag>,
    pub risk: RiskLevel,
    pub units_listed: u64,
    pub units_sold: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArbitrageParams {
    /// Data center whose worlds are scanned.
    pub dc: Option<String>,
    /// Comma-separated world list; takes precedence over `dc`.
    pub worlds: Option<String>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct WorldPrice {
    pub world: String,
    pub lowest_price: Option<u64>,
    pub deviation: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ArbitrageView {
    pub item_id: ItemId,
    pub name: Option<String>,
    pub median: Option<f64>,
    pub cheapest: Option<String>,
    pub results: Vec<WorldPrice>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    pub item_id: ItemId,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub count: usize,
    pub items: Vec<CatalogEntry>,
}

#[derive(Debug, Serialize)]
pub struct ItemName {
    pub item_id: ItemId,
    pub name: Option<String>,
    pub found: bool,
}

#[derive(Debug, Deserialize)]
pub struct WorldsParams {
    pub data_center: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /advice
pub async fn get_advice(
    State(state): State<AppState>,
    Query(params): Query<AdviceParams>,
) -> Result<Json<AdviceResponse>, ApiError> {
    let query = params.into_query()?;
    state.check_world(&query.world)?;

    let resp = state.engine.advise(&query).await?;
    info!(
        world = %resp.world,
        count = resp.count(),
        scanned = resp.scanned,
        level = ?resp.fallback_level,
        "Advice served"
    );
    Ok(Json(resp))
}

/// GET /market/item/:id
pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<ItemId>,
    Query(params): Query<ItemParams>,
) -> Result<Json<ItemReport>, ApiError> {
    state.check_world(&params.world)?;
    let probe = AdviceParams {
        world: Some(params.world.clone()),
        target: params.target,
        quantile: params.quantile,
        ..AdviceParams::default()
    }
    .into_query()?;
    let estimator = probe.estimator()?;

    let snapshot = tokio::time::timeout(
        state.fetch_timeout,
        state.market.fetch(item_id, &params.world),
    )
    .await
    .map_err(|_| BrokerError::Unavailable {
        item_id,
        world: params.world.clone(),
        message: "timed out".into(),
    })??;

    let metrics = state.calculator.compute(&snapshot, estimator)?;
    let (score, flags) = state.scoring.score(&metrics);
    let risk = state.scoring.risk(score, &flags);

    Ok(Json(ItemReport {
        world: snapshot.world.clone(),
        name: state.catalog.name(item_id).await,
        units_listed: snapshot.units_listed(),
        units_sold: snapshot.units_sold(),
        metrics,
        score,
        flags,
        risk,
    }))
}

/// GET /market/arbitrage/:id
pub async fn get_arbitrage(
    State(state): State<AppState>,
    Path(item_id): Path<ItemId>,
    Query(params): Query<ArbitrageParams>,
) -> Result<Json<ArbitrageView>, ApiError> {
    let worlds = resolve_worlds(&state, &params)?;
    let concurrency = params
        .concurrency
        .unwrap_or(state.arbitrage.default_concurrency)
        .clamp(1, state.arbitrage.max_concurrency.max(1));

    let report = state.scanner.scan(item_id, &worlds, concurrency).await;
    let results = report
        .results
        .iter()
        .map(|r| WorldPrice {
            world: r.world.clone(),
            lowest_price: r.lowest_price,
            deviation: report.deviation_of(r),
        })
        .collect();

    Ok(Json(ArbitrageView {
        item_id,
        name: state.catalog.name(item_id).await,
        median: report.median,
        cheapest: report.cheapest().map(|r| r.world.clone()),
        results,
    }))
}

fn resolve_worlds(state: &ApiState, params: &ArbitrageParams) -> Result<Vec<String>, ApiError> {
    if let Some(list) = params.worlds.as_deref() {
        let worlds: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(String::from)
            .collect();
        if worlds.is_empty() {
            return Err(ApiError::BadRequest("worlds is empty".into()));
        }
        for w in &worlds {
            state.check_world(w)?;
        }
        return Ok(worlds);
    }

    match params.dc.as_deref() {
        Some(dc) => state
            .worlds
            .worlds_in(dc)
            .ok_or_else(|| ApiError::NotFound(format!("unknown data center: {dc}"))),
        None => Err(ApiError::BadRequest("either dc or worlds is required".into())),
    }
}

/// GET /catalog/item/:id
pub async fn get_item_name(
    State(state): State<AppState>,
    Path(item_id): Path<ItemId>,
) -> Json<ItemName> {
    let name = state.catalog.name(item_id).await;
    Json(ItemName {
        item_id,
        found: name.is_some(),
        name,
    })
}

/// GET /catalog/search
pub async fn search_catalog(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, ApiError> {
    let limit = params.limit.unwrap_or(SEARCH_DEFAULT_LIMIT);
    if !(1..=SEARCH_MAX_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be in 1..={SEARCH_MAX_LIMIT}, got {limit}"
        )));
    }

    let q = params.q.unwrap_or_default();
    let items: Vec<CatalogEntry> = state
        .catalog
        .search(&q, limit)
        .await
        .into_iter()
        .map(|(item_id, name)| CatalogEntry { item_id, name })
        .collect();
    Ok(Json(SearchResults {
        count: items.len(),
        items,
    }))
}

/// GET /data/data-centers
pub async fn get_data_centers(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, Vec<String>>> {
    let worlds = &state.worlds;
    Json(
        worlds
            .data_centers
            .keys()
            .filter_map(|dc| worlds.worlds_in(dc).map(|w| (dc.clone(), w)))
            .collect(),
    )
}

/// GET /data/worlds
pub async fn get_worlds(
    State(state): State<AppState>,
    Query(params): Query<WorldsParams>,
) -> Result<Json<Vec<String>>, ApiError> {
    match params.data_center.as_deref() {
        Some(dc) => state
            .worlds
            .worlds_in(dc)
            .map(Json)
            .ok_or_else(|| ApiError::NotFound(format!("unknown data center: {dc}"))),
        None => Ok(Json(state.worlds.all_worlds())),
    }
}
