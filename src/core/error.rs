//! Error types and handling for the gateway.
//!
//! This module provides a unified error type [`AppError`] with OpenAI-shaped
//! JSON error bodies. Every error carries a stable `type` identifier so
//! clients can branch on failure kind without parsing messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the gateway.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing, malformed, or unknown credential
    #[error("Invalid or missing API key")]
    Unauthorized,

    /// Requested model has no configured backend
    #[error("Model '{0}' is not configured")]
    UnknownModel(String),

    /// Backend did not produce a complete response within the deadline
    #[error("Upstream backend timed out")]
    UpstreamTimeout,

    /// Backend responded with a failure status
    #[error("Upstream backend error (HTTP {status})")]
    UpstreamError { status: u16 },

    /// Backend connection failed before any response
    #[error("Failed to reach upstream backend")]
    UpstreamUnreachable,

    /// Upstream stream ended abnormally mid-relay
    #[error("Upstream stream ended unexpectedly")]
    StreamTruncated,

    /// Client provided an invalid request body
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable identifier for the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "unauthorized",
            AppError::UnknownModel(_) => "unknown_model",
            AppError::UpstreamTimeout => "upstream_timeout",
            AppError::UpstreamError { .. } => "upstream_error",
            AppError::UpstreamUnreachable => "upstream_error",
            AppError::StreamTruncated => "stream_truncated",
            AppError::BadRequest(_) => "bad_request",
            AppError::Serialization(_) => "internal_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for the failure.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::UnknownModel(_) => StatusCode::NOT_FOUND,
            AppError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::UpstreamError { status } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::UpstreamUnreachable => StatusCode::BAD_GATEWAY,
            AppError::StreamTruncated => StatusCode::BAD_GATEWAY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        // Messages are rebuilt from scratch so backend host/port from
        // reqwest error strings never reach the client.
        if e.is_timeout() {
            AppError::UpstreamTimeout
        } else if e.is_connect() {
            AppError::UpstreamUnreachable
        } else if let Some(status) = e.status() {
            AppError::UpstreamError {
                status: status.as_u16(),
            }
        } else {
            AppError::UpstreamError { status: 502 }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind(),
                "code": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AppError::Unauthorized.to_string(),
            "Invalid or missing API key"
        );
        assert_eq!(
            AppError::UnknownModel("gpt-4".into()).to_string(),
            "Model 'gpt-4' is not configured"
        );
        assert_eq!(
            AppError::UpstreamTimeout.to_string(),
            "Upstream backend timed out"
        );
    }

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(AppError::Unauthorized.kind(), "unauthorized");
        assert_eq!(AppError::UnknownModel("x".into()).kind(), "unknown_model");
        assert_eq!(AppError::UpstreamTimeout.kind(), "upstream_timeout");
        assert_eq!(
            AppError::UpstreamError { status: 500 }.kind(),
            "upstream_error"
        );
    }

    #[test]
    fn test_unauthorized_response() {
        let response = AppError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_unknown_model_response() {
        let response = AppError::UnknownModel("nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_timeout_response() {
        let response = AppError::UpstreamTimeout.into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_upstream_error_propagates_status() {
        let response = AppError::UpstreamError { status: 503 }.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        // Nonsense statuses fall back to 502
        let response = AppError::UpstreamError { status: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_unreachable_response() {
        let response = AppError::UpstreamUnreachable.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let app_err: AppError = json_err.into();
        assert!(matches!(app_err, AppError::Serialization(_)));
    }
}
