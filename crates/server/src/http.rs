//! HTTP Endpoints
//!
//! Carrier webhooks plus health, metrics and read-only session endpoints.

use std::time::Duration;

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::voice::{self, PROCESS_INPUT_PATH, RECORDING_PATH, VOICE_PATH};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let server = &state.settings.server;
    let cors_layer = build_cors_layer(&server.cors.origins, server.cors.enabled);
    let timeout = Duration::from_millis(server.request_timeout_ms);

    Router::new()
        // Carrier webhooks
        .route(VOICE_PATH, post(voice::voice_webhook))
        .route(PROCESS_INPUT_PATH, post(voice::process_input))
        .route(RECORDING_PATH, post(voice::recording_webhook))
        // Session introspection
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:call_id", get(get_session))
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors is disabled, returns a permissive layer (for dev)
/// - If no origin parses, defaults to localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No valid CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static("http://localhost:3000"))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Get one call's session
async fn get_session(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let session = state.registry.get(&call_id).ok_or(StatusCode::NOT_FOUND)?;
    let session = session.lock().await;
    Ok(Json(session.summary()))
}

/// List sessions
async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.registry.list();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}

/// Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check: the generation capability must be reachable
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let llm_ready = state.deps.llm.is_available().await;
    let body = Json(serde_json::json!({
        "ready": llm_ready,
        "llm": {
            "model": state.deps.llm.model_name(),
            "available": llm_ready,
        },
        "active_calls": state.registry.count(),
    }));

    if llm_ready {
        (StatusCode::OK, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_builds_for_all_modes() {
        let _ = build_cors_layer(&[], false);
        let _ = build_cors_layer(&["not a header\n".to_string()], true);
        let _ = build_cors_layer(&["https://dialer.example.com".to_string()], true);
    }
}
