use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Webhook signature did not match the raw request body.
    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Deployment misconfiguration (missing secret, unset env var).
    /// Answers 500 so the webhook provider keeps retrying.
    #[error("server misconfigured: {0}")]
    Config(String),

    #[error("no license signing key configured")]
    KeyUnavailable,

    #[error("license signing key format invalid: {0}")]
    KeyFormatInvalid(String),

    #[error("license signing failed: {0}")]
    SigningFailed(String),

    #[error("canonicalization failed: {0}")]
    Canonical(#[from] crate::canonical::CanonicalError),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidSignature | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Config(_)
            | AppError::KeyUnavailable
            | AppError::KeyFormatInvalid(_)
            | AppError::SigningFailed(_)
            | AppError::Canonical(_)
            | AppError::Db(_)
            | AppError::Pool(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // 5xx details belong in the server log, not the response body
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
