use axum::extract::DefaultBodyLimit;
use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::app_state::AppState;

pub mod health;
pub mod metrics;
pub mod tryon;

/// Application routes with body limits, compression and CORS applied.
pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        // Upload UI (embedded at compile time)
        .route("/", get(|| async { Html(include_str!("../../static/index.html")) }))
        .route("/health", get(health::health_check))
        .route(
            "/api/tryon",
            post(tryon::handle).fallback(tryon::method_not_allowed),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
