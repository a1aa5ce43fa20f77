//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

/// Error returned by handlers. Rendered as `{"error": message}`; the
/// request-id middleware adds `request_id` on the way out.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    /// An AI service (LLM, embeddings, transcription) failed.
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<atomic_core::Error> for ApiError {
    fn from(err: atomic_core::Error) -> Self {
        let message = err.to_string();
        if err.is_not_found() {
            ApiError::NotFound(message)
        } else if err.is_client_error() {
            ApiError::BadRequest(message)
        } else if err.is_upstream() {
            ApiError::Upstream(message)
        } else {
            error!(subsystem = "api", error = %message, "Request failed");
            ApiError::Internal(message)
        }
    }
}

/// Marker left on error responses so the request id can be attached.
#[derive(Debug, Clone)]
pub struct ErrorMessage(pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let mut response = (status, Json(serde_json::json!({ "error": message }))).into_response();
        response.extensions_mut().insert(ErrorMessage(message));
        response
    }
}
