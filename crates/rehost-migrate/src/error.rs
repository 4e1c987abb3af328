//! Error types for the migration run.

use thiserror::Error;

use rehost_cdn::HostError;
use rehost_store::StoreError;

/// Errors that stop a run or abandon part of it.
///
/// Per-URL failures never surface here; the worker keeps the original URL
/// and reports them as [`crate::UrlOutcome::Failed`].
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Document store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Image host client could not be built.
    #[error("image host error: {0}")]
    Host(#[from] HostError),

    /// Run configuration is invalid or incomplete.
    #[error("configuration error: {0}")]
    Config(String),

    /// Report or fixture file I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
