//! JSON API: Axum server over the advice engine and arbitrage scanner.
//!
//! CORS is permissive for GET so a browser front-end can call it directly.
//! Every response carries an `x-request-id`.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use std::future::Future;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

pub use routes::{ApiState, AppState};

pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Bind `host:port` and serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    host: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API address {addr}"))?;
    info!(addr = %addr, "API server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE, REQUEST_ID])
        .expose_headers([REQUEST_ID]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/advice", get(routes::get_advice))
        .route("/market/item/:id", get(routes::get_item))
        .route("/market/arbitrage/:id", get(routes::get_arbitrage))
        .route("/catalog/item/:id", get(routes::get_item_name))
        .route("/catalog/search", get(routes::search_catalog))
        .route("/data/data-centers", get(routes::get_data_centers))
        .route("/data/worlds", get(routes::get_worlds))
        .layer(middleware::from_fn(request_id))
        .layer(cors)
        .with_state(state)
}

/// Tag the request with an id (reusing the caller's if sent) and log it.
async fn request_id(req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let mut resp = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        resp.headers_mut().insert(REQUEST_ID, value);
    }
    info!(
        request_id = %id,
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    resp
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
