//! # Error Handling
//!
//! Application-wide error type and its conversion into HTTP responses.
//!
//! Every ceremony failure maps to exactly one category so a client can tell
//! "start over" (`no_challenge`, `expired`) apart from "this response is wrong"
//! (`verification_failed`) or "try again later" (`upstream_timeout`).
//!
//! Error messages are built from static descriptions and identities only.
//! Challenge, key and credential bytes never appear in them.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-wide error type
///
/// The `#[from]` conversion lets `?` lift sqlx errors directly.
#[derive(Error, Debug)]
pub enum AppError {
    /// The identity has no merchant record (onboarding not completed)
    #[error("Merchant '{0}' is not registered")]
    NotRegistered(String),

    /// Resource not found (no credential for the identity, unknown merchant)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The identity already holds a credential
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No pending ceremony for the identity (never issued, consumed or overwritten)
    #[error("No challenge found for '{0}'")]
    NoChallenge(String),

    /// The pending ceremony outlived its time-to-live
    #[error("Challenge for '{0}' has expired")]
    Expired(String),

    /// Required fields missing or structurally invalid
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// The credential codec exhausted every decoding strategy
    #[error("Decode error: {0}")]
    Decode(String),

    /// Challenge, origin, type, flags, counter or signature mismatch
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// The presented credential id matches none of the identity's records
    #[error("Unknown credential for '{0}'")]
    UnknownCredential(String),

    /// An external collaborator did not answer in time
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// An external collaborator failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Database errors (sqlx); reported to clients as an upstream failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Missing or invalid session / magic-link token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unexpected internal failure
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable category, used as the `error` field of responses
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotRegistered(_) => "not_registered",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::NoChallenge(_) => "no_challenge",
            AppError::Expired(_) => "expired",
            AppError::MalformedRequest(_) => "malformed_request",
            AppError::Decode(_) => "decode_error",
            AppError::VerificationFailed(_) => "verification_failed",
            AppError::UnknownCredential(_) => "unknown_credential",
            AppError::UpstreamTimeout(_) => "upstream_timeout",
            AppError::Upstream(_) | AppError::Database(_) => "upstream_error",
            AppError::Internal(_) => "internal_error",
            AppError::Unauthorized(_) => "unauthorized",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotRegistered(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NoChallenge(_)
            | AppError::Expired(_)
            | AppError::MalformedRequest(_)
            | AppError::Decode(_) => StatusCode::BAD_REQUEST,
            AppError::VerificationFailed(_)
            | AppError::UnknownCredential(_)
            | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Upstream(_) | AppError::Database(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert AppError into an HTTP response
///
/// Body format: `{ "error": "<code>", "message": "<detail>" }`.
/// Database and internal failures are logged and replaced by a generic
/// message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Persistence service error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Upstream(msg) | AppError::UpstreamTimeout(msg) => {
                tracing::error!("{}: {}", self.code(), msg);
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": self.code(),
            "message": message,
        }));

        (self.status(), body).into_response()
    }
}

/// Convenience alias for results carrying [`AppError`]
pub type AppResult<T> = Result<T, AppError>;
