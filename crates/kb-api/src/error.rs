//! API error type and JSON error bodies.
//!
//! Every failure leaves the API as `{"error": <code>, "message": <text>}`
//! with a status code matching the error category.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use kb_core::error::KbError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g. "bad_request", "not_found").
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400 - missing or invalid input.
    BadRequest(String),
    /// 401 - missing or unknown bearer token.
    Unauthorized(String),
    /// 403 - authenticated but lacking the required role.
    Forbidden(String),
    /// 404 - no such document.
    NotFound(String),
    /// 413 - upload exceeds the configured limit.
    PayloadTooLarge(String),
    /// 500 - the vector engine rejected or failed a write.
    Engine(String),
    /// 500 - unexpected server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
            }
            ApiError::Engine(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "engine_error", msg),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        let body = ErrorBody {
            error: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<KbError> for ApiError {
    fn from(err: KbError) -> Self {
        match err {
            KbError::Validation(msg) | KbError::Import(msg) | KbError::Config(msg) => {
                ApiError::BadRequest(msg)
            }
            KbError::Engine(msg) => ApiError::Engine(msg),
            other => {
                tracing::error!(error = %other, "Internal error while handling request");
                ApiError::Internal("Internal server error".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kb_error_mapping() {
        let cases = [
            (KbError::Validation("v".into()), StatusCode::BAD_REQUEST),
            (KbError::Import("i".into()), StatusCode::BAD_REQUEST),
            (KbError::Engine("e".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (KbError::Storage("s".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_internal_errors_are_sanitised() {
        match ApiError::from(KbError::Storage("Lock poisoned: secret".into())) {
            ApiError::Internal(msg) => assert_eq!(msg, "Internal server error"),
            other => panic!("unexpected mapping: {:?}", other),
        }
    }
}
