use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::{
    config::EngineConfig,
    dispatcher::Dispatcher,
    error::EngineError,
    metrics::MetricsRegistry,
    models::{ExecRequest, ExecutionResult},
};

#[derive(Clone)]
pub struct AppState {
    config: EngineConfig,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<MetricsRegistry>,
}

pub fn routes(
    config: EngineConfig,
    dispatcher: Arc<Dispatcher>,
    metrics_registry: Arc<MetricsRegistry>,
) -> Router {
    let state = AppState {
        config,
        dispatcher,
        metrics: metrics_registry,
    };
    // The caller is a browser fetch from an arbitrary origin.
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route("/run", post(run))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    (StatusCode::OK, state.metrics.render_prometheus())
}

async fn run(
    State(state): State<AppState>,
    payload: Result<Json<ExecRequest>, JsonRejection>,
) -> Result<Json<ExecutionResult>, EngineError> {
    let Json(request) =
        payload.map_err(|rejection| EngineError::InvalidRequest(rejection.body_text()))?;
    validate_request(&state.config, &request)?;
    let result = state.dispatcher.execute(request).await?;
    Ok(Json(result))
}

/// Shape checks only; language validation lives in the dispatcher. Empty
/// code is legal and produces empty output.
fn validate_request(config: &EngineConfig, request: &ExecRequest) -> Result<(), EngineError> {
    if request.code.len() > config.max_code_bytes {
        return Err(EngineError::InvalidRequest("code too large".to_string()));
    }
    if request.input.len() > config.max_stdin_bytes {
        return Err(EngineError::InvalidRequest("stdin too large".to_string()));
    }
    Ok(())
}
