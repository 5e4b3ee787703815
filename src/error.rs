use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Faults recovered at the dispatcher boundary. Execution-level failures
/// (non-zero exit, timeout) are not errors here; they travel as the
/// `error` variant of [`crate::models::ExecutionResult`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("server busy, try again later")]
    Busy,
    #[error("execution backend failure")]
    Infrastructure,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match self {
            EngineError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
            EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            EngineError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
