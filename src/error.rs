//! Error types for Solofed
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.
//!
//! Federation-internal failures (inbound side effects, fan-out delivery)
//! are logged where they happen and never reach a remote peer; only the
//! synchronous user-facing paths hand an `AppError` to axum.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Maximum number of response body bytes kept in a `Fetch` error.
pub const FETCH_BODY_EXCERPT_BYTES: usize = 512;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed inbound payload (400)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Outbound fetch target rejected by the SSRF guard (403)
    #[error("Security error: {0}")]
    Security(String),

    /// Remote server answered with a non-2xx status (502)
    #[error("Fetch failed with HTTP {status}: {body}")]
    Fetch { status: u16, body: String },

    /// Remote document is missing required protocol fields (502)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Collaborator store failure (500)
    #[error("Storage error: {0}")]
    Database(#[from] sqlx::Error),

    /// Key generation, encoding or signing failure (500)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Transport-level HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Build a `Fetch` error, truncating the body to a short excerpt.
    pub fn fetch(status: u16, body: &str) -> Self {
        let mut end = body.len().min(FETCH_BODY_EXCERPT_BYTES);
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        AppError::Fetch {
            status,
            body: body[..end].to_string(),
        }
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Parse(_) => "parse",
            AppError::NotFound => "not_found",
            AppError::Security(_) => "security",
            AppError::Fetch { .. } => "fetch",
            AppError::Protocol(_) => "protocol",
            AppError::Database(_) => "storage",
            AppError::Crypto(_) => "crypto",
            AppError::HttpClient(_) => "http_client",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Server-side failures get a generic message so store or key
    /// details never leak to the caller.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message) = match &self {
            AppError::Parse(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Security(_) => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::Fetch { .. } | AppError::Protocol(_) | AppError::HttpClient(_) => {
                (StatusCode::BAD_GATEWAY, "Federation error".to_string())
            }
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
            ),
            AppError::Crypto(_) | AppError::Config(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.kind()]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_truncates_long_bodies() {
        let body = "x".repeat(FETCH_BODY_EXCERPT_BYTES * 2);
        match AppError::fetch(500, &body) {
            AppError::Fetch { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), FETCH_BODY_EXCERPT_BYTES);
            }
            other => panic!("expected fetch error, got: {other:?}"),
        }
    }

    #[test]
    fn fetch_error_truncates_on_char_boundary() {
        let body = "é".repeat(FETCH_BODY_EXCERPT_BYTES);
        match AppError::fetch(404, &body) {
            AppError::Fetch { body, .. } => {
                assert!(body.len() <= FETCH_BODY_EXCERPT_BYTES);
                assert!(body.chars().all(|c| c == 'é'));
            }
            other => panic!("expected fetch error, got: {other:?}"),
        }
    }

    #[test]
    fn parse_error_maps_to_bad_request() {
        let response = AppError::Parse("bad json".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn security_error_maps_to_forbidden() {
        let response = AppError::Security("loopback".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
