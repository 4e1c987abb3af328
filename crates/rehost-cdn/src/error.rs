//! Error types for image host uploads.

use thiserror::Error;

/// Errors that can occur when uploading to an image host.
#[derive(Debug, Error)]
pub enum HostError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The host rejected the upload.
    #[error("upload rejected ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limited.
    #[error("rate limited")]
    RateLimited,

    /// Invalid response from server.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl HostError {
    /// Check if an error is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            HostError::Http(e) => e.is_timeout() || e.is_connect(),
            HostError::RateLimited => true,
            HostError::Api { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}
