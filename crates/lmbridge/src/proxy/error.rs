//! Error handling for proxied requests
//!
//! Errors raised before any bytes reach the client become a clean HTTP
//! status with an Anthropic-style error body:
//! - Backend unreachable: 502 Bad Gateway
//! - Everything else: 500 Internal Server Error
//!
//! Once a stream has started the status line is already sent, so mid-stream
//! failures are only logged and the body ends.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::translate::TranslateError;

/// Errors that can occur while handling a Messages API request
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    /// Transport-level failure talking to the backend
    #[error("Error connecting to backend: {0}")]
    UpstreamUnreachable(String),

    /// Backend reply could not be translated
    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// Backend answered with a non-success status
    #[error("Backend returned {status}: {body}")]
    UpstreamStatus { status: StatusCode, body: String },

    /// Inbound body is not a Messages API request
    #[error("Invalid request body: {0}")]
    InvalidRequest(String),

    /// Anything else
    #[error("{0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status returned to the client
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error category for logging and the `error.type` field
    pub fn category(&self) -> &'static str {
        match self {
            ProxyError::UpstreamUnreachable(_) => "upstream_unreachable",
            ProxyError::MalformedUpstreamResponse(_) => "malformed_upstream_response",
            ProxyError::UpstreamStatus { .. } => "upstream_error",
            ProxyError::InvalidRequest(_) => "invalid_request_error",
            ProxyError::Internal(_) => "api_error",
        }
    }
}

impl From<TranslateError> for ProxyError {
    fn from(error: TranslateError) -> Self {
        match error {
            TranslateError::MalformedUpstreamResponse(message) => {
                ProxyError::MalformedUpstreamResponse(message)
            }
            other => ProxyError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();

        tracing::error!(
            error_type = self.category(),
            status = %status,
            error_message = %self,
            "Request failed"
        );

        let body = serde_json::json!({
            "type": "error",
            "error": {
                "type": self.category(),
                "message": self.to_string(),
            }
        });

        (status, Json(body)).into_response()
    }
}
