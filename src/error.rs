use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Per-field validation messages, serialized as `{"field": ["message", ...]}`.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub const BAD_CREDENTIALS_MESSAGE: &str =
    "Sorry, we could not find a user with the provided credentials. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(FieldErrors),
    #[error("{message}")]
    BadRequest { code: &'static str, message: String },
    #[error("authentication credentials were not provided")]
    Unauthorized,
    #[error("{message}")]
    Forbidden { code: &'static str, message: String },
    #[error("{message}")]
    NotFound { code: &'static str, message: String },
    #[error("{message}")]
    Conflict { code: &'static str, message: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest { code, message: message.into() }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Forbidden { code, message: message.into() }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::NotFound { code, message: message.into() }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Conflict { code, message: message.into() }
    }

    /// Admin-only endpoints called before `register-instance` has run.
    pub fn instance_not_registered() -> Self {
        Self::forbidden("instance_not_registered", "Instance is not registered yet")
    }

    /// Public endpoints called before `register-instance` has run.
    pub fn instance_not_configured() -> Self {
        Self::bad_request("instance_not_configured", "Instance is not configured")
    }

    pub fn admin_already_registered() -> Self {
        Self::bad_request(
            "admin_already_registered",
            "Admin for this instance is already registered",
        )
    }

    pub fn invalid_credentials() -> Self {
        Self::forbidden("invalid_credentials", BAD_CREDENTIALS_MESSAGE)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<crate::crypto::CryptoError> for ApiError {
    fn from(err: crate::crypto::CryptoError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("serialization failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(fields) => return (status, Json(fields)).into_response(),
            ApiError::BadRequest { code, message }
            | ApiError::Forbidden { code, message }
            | ApiError::NotFound { code, message }
            | ApiError::Conflict { code, message } => {
                serde_json::json!({ "error": message, "code": code })
            }
            ApiError::Unauthorized => serde_json::json!({
                "error": "Authentication credentials were not provided.",
                "code": "not_authenticated",
            }),
            ApiError::Database(e) => {
                tracing::error!(error = %e, "Database error while handling request");
                serde_json::json!({ "error": "Something went wrong, please try again later.", "code": "internal" })
            }
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Internal error while handling request");
                serde_json::json!({ "error": "Something went wrong, please try again later.", "code": "internal" })
            }
        };
        (status, Json(body)).into_response()
    }
}
