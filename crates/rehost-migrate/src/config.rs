//! Run configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::MigrateError;

/// Default user agent sent with every download.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; ImageMigrator/1.0)";

/// How a run treats the documents it finds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Migrate every legacy URL of every document.
    #[default]
    Normal,
    /// Migrate the first document that has a legacy URL, then stop.
    Test,
    /// Count legacy URLs without downloading, uploading or writing.
    DryRun,
}

impl RunMode {
    /// Pick the mode from command-line flags. Dry-run wins over test.
    pub fn from_flags(dry_run: bool, test: bool) -> Self {
        if dry_run {
            RunMode::DryRun
        } else if test {
            RunMode::Test
        } else {
            RunMode::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Normal => "normal",
            RunMode::Test => "test",
            RunMode::DryRun => "dry-run",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable settings for one migration run.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub mode: RunMode,
    /// Log full document structure and per-field decisions.
    pub debug: bool,
    /// Collections to scan, in order.
    pub collections: Vec<String>,
    /// Documents processed concurrently per batch.
    pub batch_size: usize,
    /// Pause between batches.
    pub batch_delay: Duration,
    /// Per-request download timeout.
    pub download_timeout: Duration,
    /// Redirects followed before a download is abandoned.
    pub max_redirects: usize,
    /// URL migrations in flight per document.
    pub url_concurrency: usize,
    /// First segment of every upload identifier.
    pub namespace: String,
    pub user_agent: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Normal,
            debug: false,
            collections: vec!["products".to_string()],
            batch_size: 5,
            batch_delay: Duration::from_secs(2),
            download_timeout: Duration::from_secs(30),
            max_redirects: 5,
            url_concurrency: 1,
            namespace: "migrated".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl MigrationConfig {
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = collections.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_batch_delay(mut self, batch_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_url_concurrency(mut self, url_concurrency: usize) -> Self {
        self.url_concurrency = url_concurrency;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), MigrateError> {
        if self.batch_size == 0 {
            return Err(MigrateError::Config(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.url_concurrency == 0 {
            return Err(MigrateError::Config(
                "url concurrency must be at least 1".to_string(),
            ));
        }
        if self.collections.is_empty() {
            return Err(MigrateError::Config(
                "at least one collection is required".to_string(),
            ));
        }
        if let Some(empty) = self.collections.iter().find(|c| c.trim().is_empty()) {
            return Err(MigrateError::Config(format!(
                "invalid collection name {:?}",
                empty
            )));
        }
        if self.namespace.trim_matches('/').is_empty() {
            return Err(MigrateError::Config(
                "upload namespace must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
