//! HTTP front door: request validation, bearer auth, and the JSON surface
//! over the browser resource controller in `riptide-headless`.

pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod validation;

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use riptide_headless::{BrowserPool, ExtractionPipeline};
use riptide_types::AppConfig;
use tower_http::trace::TraceLayer;

/// Shared application state handed to every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: Arc<BrowserPool>,
    pub pipeline: Arc<ExtractionPipeline>,
}

/// Builds the extraction router: `POST /extract` behind bearer auth, plus an
/// unauthenticated `GET /health`. Mounted on `AppConfig::port`.
pub fn extraction_router(state: AppState) -> Router {
    let extract_route = Router::new()
        .route("/extract", post(handlers::extract::extract))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    Router::new()
        .merge(extract_route)
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the Prometheus scrape router. Mounted on `AppConfig::metrics_port`.
pub fn metrics_router(state: AppState) -> Router {
    metrics::router(state).layer(TraceLayer::new_for_http())
}
