//! Prometheus metrics
//!
//! Counters and histograms are recorded through the `metrics` facade at the
//! call sites; this module installs the exporter and serves its output.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;

/// Turn latency buckets in seconds, sized around the carrier's response window
const TURN_BUCKETS: &[f64] = &[0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 8.0, 12.0];

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("outreach_turn_duration_seconds".to_string()),
            TURN_BUCKETS,
        )
        .map_err(|e| format!("Invalid histogram buckets: {}", e))?
        .install_recorder()
        .map_err(|e| format!("Failed to install metrics recorder: {}", e))
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [("content-type", "text/plain; version=0.0.4")],
            "metrics disabled\n".to_string(),
        ),
    }
}
