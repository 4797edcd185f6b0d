use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

/// Request-terminal error taxonomy of the account workflow. Each variant
/// maps to exactly one HTTP status so the transport layer never has to
/// inspect messages.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("email already registered by another user")]
    DuplicateEmail,

    #[error("user not found")]
    NotFound,

    #[error("no permission to modify this resource")]
    Forbidden,

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::DuplicateEmail => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
