use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics: try-on counters and latency histograms in Prometheus
/// text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}

/// Register descriptions for the metrics emitted by the try-on routes.
pub fn describe() {
    metrics::describe_counter!("tryon_requests_total", "Try-on requests received");
    metrics::describe_counter!(
        "tryon_requests_failed_total",
        "Try-on requests that ended without an image, by reason"
    );
    metrics::describe_histogram!(
        "tryon_duration_seconds",
        "Wall-clock time of a try-on request, including vendor polling"
    );
    metrics::describe_histogram!(
        "tryon_poll_attempts",
        "Query calls issued per submitted vendor job"
    );
}
