//! Room service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Store
//! failures are logged server-side and surfaced to clients as a generic
//! message, so connection strings and script errors never leak.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::crypto::CryptoError;
use serde::Serialize;
use thiserror::Error;

/// Room service error type.
///
/// Maps to HTTP status codes:
/// - NotFound: 404
/// - Forbidden: 403
/// - Unauthorized, InvalidCredential: 401
/// - RoomFull: 409
/// - RateLimited: 429 (with `Retry-After`)
/// - Validation: 400
/// - Store: 503 (fail closed)
/// - Internal: 500
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Room is full")]
    RoomFull,

    #[error("Rate limit exceeded")]
    RateLimited {
        /// Epoch seconds at which the oldest counted request leaves the window.
        reset_at: i64,
        /// Seconds until `reset_at`, never zero.
        retry_after_secs: u64,
    },

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal server error")]
    Internal,
}

impl RoomError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            RoomError::NotFound(_) => 404,
            RoomError::Forbidden(_) => 403,
            RoomError::Unauthorized(_) | RoomError::InvalidCredential => 401,
            RoomError::RoomFull => 409,
            RoomError::RateLimited { .. } => 429,
            RoomError::Validation(_) => 400,
            RoomError::Store(_) => 503,
            RoomError::Internal => 500,
        }
    }

    /// Short, bounded label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RoomError::NotFound(_) => "not_found",
            RoomError::Forbidden(_) => "forbidden",
            RoomError::Unauthorized(_) => "unauthorized",
            RoomError::RoomFull => "room_full",
            RoomError::RateLimited { .. } => "rate_limited",
            RoomError::InvalidCredential => "invalid_credential",
            RoomError::Validation(_) => "validation",
            RoomError::Store(_) => "store",
            RoomError::Internal => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reset_at: Option<i64>,
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        let mut reset_at = None;
        let mut retry_after = None;

        let (status, code, message) = match &self {
            RoomError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
            RoomError::Forbidden(reason) => (StatusCode::FORBIDDEN, "FORBIDDEN", reason.clone()),
            RoomError::Unauthorized(reason) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", reason.clone())
            }
            RoomError::RoomFull => (
                StatusCode::CONFLICT,
                "ROOM_FULL",
                "Room already has two participants".to_string(),
            ),
            RoomError::RateLimited {
                reset_at: at,
                retry_after_secs,
            } => {
                reset_at = Some(*at);
                retry_after = Some(*retry_after_secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "RATE_LIMITED",
                    "Too many requests. Please try again later.".to_string(),
                )
            }
            RoomError::InvalidCredential => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIAL",
                "Invalid credential".to_string(),
            ),
            RoomError::Validation(reason) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", reason.clone())
            }
            RoomError::Store(err) => {
                tracing::error!(target: "rs.store", error = %err, "Store operation failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            RoomError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                reset_at,
            },
        };

        let mut response = (status, Json(body)).into_response();

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}

impl From<redis::RedisError> for RoomError {
    fn from(err: redis::RedisError) -> Self {
        RoomError::Store(err.to_string())
    }
}

impl From<CryptoError> for RoomError {
    fn from(err: CryptoError) -> Self {
        tracing::error!(target: "rs.crypto", error = %err, "Crypto operation failed");
        RoomError::Internal
    }
}
