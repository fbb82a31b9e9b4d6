use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("vehicle or driver unavailable: {0}")]
    Unavailable(String),

    #[error("already responded: {0}")]
    AlreadyResponded(String),

    #[error("expired: {0}")]
    Expired(String),

    #[error("principal mismatch: {0}")]
    PrincipalMismatch(String),

    #[error("trip is terminal: {0}")]
    TripTerminal(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::CapacityExceeded(_)
            | AppError::Unavailable(_)
            | AppError::AlreadyResponded(_)
            | AppError::TripTerminal(_) => StatusCode::CONFLICT,
            AppError::Expired(_) => StatusCode::GONE,
            AppError::PrincipalMismatch(_) => StatusCode::FORBIDDEN,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
