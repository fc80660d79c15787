//! Search error types.
//!
//! Every variant maps to an HTTP status code.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(SearchError::InvalidRequest { .. })` and the caller receives a
//! `{"error": "..."}` JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

/// Maximum number of bytes of an upstream error body kept in an error.
pub const MAX_ERROR_DETAIL_BYTES: usize = 512;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors produced while serving a search.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The caller sent an unusable search request.
    #[error("{message}")]
    InvalidRequest { message: String },

    /// No connection string was supplied at all.
    #[error("Storage connection not configured")]
    NotConfigured,

    /// The connection string or another required setting is malformed.
    #[error("Storage configuration error: {message}")]
    Configuration { message: String },

    /// The storage service answered with a non-2xx status.
    #[error("Storage service returned HTTP {status}: {detail}")]
    StorageApi { status: u16, detail: String },

    /// The storage service could not be reached.
    #[error("Storage service unreachable: {message}")]
    Transport { message: String },

    /// The listing body could not be read as XML.
    #[error("Could not parse storage listing: {message}")]
    Parse { message: String },

    /// The whole search did not finish within its deadline.
    #[error("Search did not complete within {}s", .0.as_secs())]
    DeadlineExceeded(Duration),

    /// Catch-all for unexpected internal errors.
    #[error("Search failed: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SearchError {
    /// Build a [`SearchError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        SearchError::Configuration {
            message: message.into(),
        }
    }

    /// Build a [`SearchError::StorageApi`], truncating `body`.
    pub fn storage_api(status: u16, body: &str) -> Self {
        SearchError::StorageApi {
            status,
            detail: truncate_detail(body),
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Only upstream 5xx responses and transport failures qualify; a 4xx
    /// (authentication, missing container) never changes on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::StorageApi { status, .. } => *status >= 500,
            SearchError::Transport { .. } => true,
            _ => false,
        }
    }

    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            SearchError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            SearchError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::StorageApi { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::Transport { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::Parse { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::DeadlineExceeded(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::InvalidRequest { .. } => "invalid_request",
            SearchError::NotConfigured => "not_configured",
            SearchError::Configuration { .. } => "configuration",
            SearchError::StorageApi { .. } => "storage_api",
            SearchError::Transport { .. } => "transport",
            SearchError::Parse { .. } => "parse",
            SearchError::DeadlineExceeded(_) => "deadline_exceeded",
            SearchError::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest's Display includes the URL, which carries no secret for
        // SharedKey requests (the signature travels in a header).
        SearchError::Transport {
            message: err.to_string(),
        }
    }
}

/// Cut an upstream body down to [`MAX_ERROR_DETAIL_BYTES`] on a char boundary.
fn truncate_detail(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_ERROR_DETAIL_BYTES {
        return body.to_string();
    }
    let mut end = MAX_ERROR_DETAIL_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

impl IntoResponse for SearchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "error": self.to_string() });

        (
            status,
            [
                ("content-type", "application/json".to_string()),
                ("x-request-id", generate_request_id()),
            ],
            body.to_string(),
        )
            .into_response()
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_status_codes() {
        let invalid = SearchError::InvalidRequest {
            message: "missing".to_string(),
        };
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            SearchError::configuration("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            SearchError::storage_api(403, "denied").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            SearchError::DeadlineExceeded(Duration::from_secs(5)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_retry_classification() {
        assert!(SearchError::storage_api(500, "").is_retryable());
        assert!(SearchError::storage_api(503, "").is_retryable());
        assert!(!SearchError::storage_api(403, "").is_retryable());
        assert!(!SearchError::storage_api(404, "").is_retryable());
        assert!(!SearchError::storage_api(429, "").is_retryable());
        assert!(SearchError::Transport {
            message: "reset".to_string()
        }
        .is_retryable());
        assert!(!SearchError::configuration("missing").is_retryable());
        assert!(!SearchError::NotConfigured.is_retryable());
    }

    #[test]
    fn test_storage_api_detail_truncated() {
        let body = "x".repeat(4096);
        match SearchError::storage_api(500, &body) {
            SearchError::StorageApi { detail, .. } => {
                assert_eq!(detail.len(), MAX_ERROR_DETAIL_BYTES + 3);
                assert!(detail.ends_with("..."));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_truncate_detail_respects_char_boundary() {
        // 'é' is two bytes, so byte 512 falls inside a character.
        let body = format!("a{}", "é".repeat(600));
        let detail = truncate_detail(&body);
        assert!(detail.ends_with("..."));
        assert!(detail.len() <= MAX_ERROR_DETAIL_BYTES + 3);
    }

    #[test]
    fn test_short_detail_untouched() {
        assert_eq!(truncate_detail("  AuthenticationFailed  "), "AuthenticationFailed");
    }

    #[test]
    fn test_display_storage_api() {
        let err = SearchError::storage_api(403, "AuthenticationFailed");
        assert_eq!(
            err.to_string(),
            "Storage service returned HTTP 403: AuthenticationFailed"
        );
    }
}
