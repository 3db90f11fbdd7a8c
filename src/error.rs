//! Error types for fedbox
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` and renders the uniform
//! `{"success": false, "error": ...}` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::auth::AuthError;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Request body could not be read (400)
    #[error("Could not read the body of the request: {0}")]
    BodyRead(String),

    /// Request body over the size limit (413)
    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    /// JSON shape mismatch (400)
    #[error("Invalid request body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Validation error (400)
    #[error("{0}")]
    Validation(String),

    /// Sender/receiver claim not proven (401)
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// SQLite backend failure (500)
    #[error("Storage error: {0}")]
    Database(#[from] sqlx::Error),

    /// Any other backend failure (500)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Outbound federation POST failed or was rejected (502)
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Identity service failure (502)
    #[error("Identity service error: {0}")]
    Identity(String),

    /// Activity `type` outside the supported set (400)
    #[error("Unknown activity type: {0}")]
    UnknownActivityType(String),

    /// `{type}` path segment outside the supported set (404)
    #[error("Unknown actor type: {0}")]
    UnknownActorType(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// HTTP status and metric label for this error
    pub fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BodyRead(_) => (StatusCode::BAD_REQUEST, "body_read"),
            AppError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            AppError::Decode(_) => (StatusCode::BAD_REQUEST, "decode"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AppError::Auth(_) => (StatusCode::UNAUTHORIZED, "auth"),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Database(_) | AppError::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage")
            }
            AppError::Delivery(_) => (StatusCode::BAD_GATEWAY, "delivery"),
            AppError::Identity(_) => (StatusCode::BAD_GATEWAY, "identity"),
            AppError::UnknownActivityType(_) => {
                (StatusCode::BAD_REQUEST, "unknown_activity_type")
            }
            AppError::UnknownActorType(_) => (StatusCode::NOT_FOUND, "unknown_actor_type"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_type) = self.status_and_kind();

        if status.is_server_error() {
            tracing::error!(error = %self, kind = error_type, "Request failed");
        } else {
            tracing::debug!(error = %self, kind = error_type, "Request rejected");
        }

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[error_type])
            .inc();

        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
