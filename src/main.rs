use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tryon_gateway::app_state::AppState;
use tryon_gateway::config::AppConfig;
use tryon_gateway::routes;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        provider = %config.tryon_provider,
        store = %config.image_store,
        "Initializing tryon-gateway server"
    );

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    // Wire provider, image store and analyzer
    let state = AppState::from_config(&config).expect("Failed to initialize application state");

    if let Err(e) = state.provider.check_configuration() {
        // Requests will fail with a configuration error until this is fixed.
        tracing::warn!(error = %e, "Try-on provider is not fully configured");
    }
    if let Err(e) = state.store.check_configuration() {
        tracing::warn!(error = %e, "Image store is not fully configured");
    }
    if !state.analyzer.is_configured() {
        tracing::info!("Matching analysis disabled: Workers AI credentials not set");
    }

    let app = routes::router(state, config.body_limit_bytes)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http());

    tracing::info!("Starting tryon-gateway on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
