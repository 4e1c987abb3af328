//! Legacy image URL migration.
//!
//! Documents are scanned for strings pointing at the deprecated image
//! bucket. Each one is downloaded, re-uploaded to the image host and
//! replaced by the new URL, with the document's shape left intact.
//!
//! - [`classify`]: decides which strings are legacy URLs
//! - [`MigrationWorker`]: moves a single URL, keeping the original on failure
//! - [`TreeWalker`]: rewrites every legacy leaf of a document
//! - [`Orchestrator`]: batches documents across collections and writes back

pub mod classify;
mod config;
mod error;
pub mod fetch;
mod orchestrator;
mod path;
pub mod report;
mod tally;
pub mod walker;
mod worker;

pub use classify::{extract_extension, is_legacy_url, is_legacy_value};
pub use config::{DEFAULT_USER_AGENT, MigrationConfig, RunMode};
pub use error::MigrateError;
pub use fetch::{FetchError, FetchedImage, ImageFetcher};
pub use orchestrator::Orchestrator;
pub use path::FieldPath;
pub use report::{CollectionReport, DocumentReport, DocumentStatus, RunReport};
pub use tally::Tally;
pub use walker::{LegacyUrl, TreeWalker, UrlChange, Walked, find_legacy_urls};
pub use worker::{MigrationWorker, UrlMigrator, UrlOutcome, upload_id};
