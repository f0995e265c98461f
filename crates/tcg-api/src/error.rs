use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use tcg_core::EngineError;

/// HTTP mapping for engine failures. Server-side causes are logged in full
/// and reported as an opaque "Server error" — store paths never reach the
/// client.
pub enum ApiError {
    Engine(EngineError),
    /// Runtime-level failure (e.g. a blocking task panicked).
    Internal,
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Engine(EngineError::Validation(field)) => {
                (StatusCode::BAD_REQUEST, format!("{field} required"))
            }
            Self::Engine(EngineError::Auth) => {
                (StatusCode::FORBIDDEN, "Invalid password".to_string())
            }
            Self::Engine(EngineError::RateLimited) => {
                (StatusCode::TOO_MANY_REQUESTS, "Too many requests".to_string())
            }
            Self::Engine(
                err @ (EngineError::LedgerAllocation(_)
                | EngineError::Store(_)
                | EngineError::Serde(_)),
            ) => {
                error!("Request failed: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
            Self::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
