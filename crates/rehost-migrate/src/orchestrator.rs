//! Batch orchestration across collections.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use rehost_store::{Document, DocumentStore, Value, changed_fields, fields_to_json};
use tracing::{debug, error, info, warn};

use crate::classify::is_legacy_value;
use crate::report::{CollectionReport, DocumentReport, DocumentStatus, RunReport};
use crate::walker::{TreeWalker, find_legacy_urls_in_fields};
use crate::{MigrateError, MigrationConfig, RunMode, Tally, UrlMigrator};

/// Drives a migration run over the configured collections.
pub struct Orchestrator {
    config: MigrationConfig,
    store: Arc<dyn DocumentStore>,
    walker: Option<TreeWalker>,
}

impl Orchestrator {
    /// Build an orchestrator.
    ///
    /// A migrator is required unless the run is a dry-run.
    pub fn new(
        config: MigrationConfig,
        store: Arc<dyn DocumentStore>,
        migrator: Option<Arc<dyn UrlMigrator>>,
    ) -> Result<Self, MigrateError> {
        config.validate()?;

        if migrator.is_none() && config.mode != RunMode::DryRun {
            return Err(MigrateError::Config(format!(
                "an image host is required for a {} run",
                config.mode
            )));
        }

        let walker = migrator.map(|m| TreeWalker::new(m, config.url_concurrency));
        Ok(Self {
            config,
            store,
            walker,
        })
    }

    /// Run every configured collection in order.
    pub async fn run(&self) -> RunReport {
        let started_at = Utc::now();
        info!(
            mode = %self.config.mode,
            collections = ?self.config.collections,
            batch_size = self.config.batch_size,
            "starting image migration"
        );

        let mut collections = Vec::with_capacity(self.config.collections.len());
        for name in &self.config.collections {
            let report = self.run_collection(name).await;
            let processed = report.tally().processed;
            collections.push(report);

            if self.config.mode == RunMode::Test && processed > 0 {
                info!(collection = %name, "test mode: stopping after the first migrated document");
                break;
            }
        }

        RunReport {
            mode: self.config.mode,
            started_at,
            finished_at: Utc::now(),
            collections,
        }
    }

    async fn run_collection(&self, name: &str) -> CollectionReport {
        info!(collection = %name, "starting collection");

        let listing = match self.store.list_documents(name).await {
            Ok(listing) => listing,
            Err(e) => {
                error!(collection = %name, error = %e, "failed to list collection, skipping it");
                return CollectionReport::failed(name, e.to_string());
            }
        };
        info!(
            collection = %name,
            documents = listing.documents.len(),
            rejected = listing.rejected.len(),
            "fetched documents"
        );

        let mut report = CollectionReport::new(name, listing.total());
        report.documents.extend(
            listing
                .rejected
                .iter()
                .map(|r| DocumentReport::rejected(&r.id, &r.error)),
        );
        let documents = listing.documents;

        if self.config.mode == RunMode::DryRun {
            report
                .documents
                .extend(documents.iter().map(|d| self.analyze(d)));
            return report;
        }

        let documents = if self.config.mode == RunMode::Test {
            match documents
                .into_iter()
                .find(|d| !find_legacy_urls_in_fields(&d.fields).is_empty())
            {
                Some(document) => {
                    info!(collection = %name, document = %document.id, "test mode: processing a single document");
                    vec![document]
                }
                None => {
                    info!(collection = %name, "test mode: no document with legacy URLs");
                    return report;
                }
            }
        } else {
            documents
        };

        let batches: Vec<&[Document]> = documents.chunks(self.config.batch_size).collect();
        let total = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            info!(
                collection = %name,
                batch = i + 1,
                batches = total,
                documents = batch.len(),
                "processing batch"
            );

            let results = join_all(batch.iter().map(|doc| self.process_document(name, doc))).await;
            report.documents.extend(results);

            if i + 1 < total {
                info!(
                    delay_ms = self.config.batch_delay.as_millis() as u64,
                    "waiting before next batch"
                );
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }

        let tally = report.tally();
        info!(
            collection = %name,
            processed = tally.processed,
            skipped = tally.skipped,
            errored = tally.errored,
            updated = report.count(DocumentStatus::Updated),
            "finished collection"
        );
        report
    }

    async fn process_document(&self, collection: &str, document: &Document) -> DocumentReport {
        let legacy_urls = find_legacy_urls_in_fields(&document.fields);
        self.log_structure(document);

        let Some(walker) = &self.walker else {
            return DocumentReport::analyzed(&document.id, legacy_urls);
        };

        if legacy_urls.is_empty() {
            debug!(document = %document.id, "no legacy URLs to migrate");
        } else {
            info!(document = %document.id, legacy_urls = legacy_urls.len(), "processing document");
        }

        let walked = walker.walk_fields(&document.fields, &document.id).await;
        let changed = changed_fields(&document.fields, &walked.value);

        if changed.is_empty() {
            if !legacy_urls.is_empty() {
                let remaining = find_legacy_urls_in_fields(&walked.value);
                warn!(
                    document = %document.id,
                    remaining = remaining.len(),
                    "document had no changes after processing"
                );
                for legacy in &remaining {
                    debug!(document = %document.id, field = %legacy.path, url = %legacy.url, "legacy URL still present");
                }
            }
            return DocumentReport {
                changes: walked.changes,
                ..DocumentReport::unchanged(&document.id, legacy_urls, walked.tally)
            };
        }

        let updated = document.with_fields(walked.value);
        match self
            .store
            .update_document(collection, &updated, &changed)
            .await
        {
            Ok(()) => {
                let remaining = find_legacy_urls_in_fields(&updated.fields).len();
                info!(
                    document = %document.id,
                    fields = ?changed,
                    migrated = legacy_urls.len().saturating_sub(remaining),
                    remaining,
                    "updated document"
                );
                DocumentReport {
                    id: document.id.clone(),
                    status: DocumentStatus::Updated,
                    legacy_urls,
                    tally: walked.tally,
                    changed_fields: changed,
                    changes: walked.changes,
                    error: None,
                }
            }
            Err(e) => {
                error!(document = %document.id, error = %e, "failed to update document");
                DocumentReport {
                    id: document.id.clone(),
                    status: DocumentStatus::Failed,
                    legacy_urls,
                    tally: walked.tally + Tally::errored(),
                    changed_fields: changed,
                    changes: walked.changes,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn analyze(&self, document: &Document) -> DocumentReport {
        let legacy_urls = find_legacy_urls_in_fields(&document.fields);
        self.log_structure(document);

        if legacy_urls.is_empty() {
            debug!(document = %document.id, "no legacy URLs");
            if let Some(Value::Array(images)) = document.fields.get("images") {
                for (index, image) in images.iter().enumerate() {
                    debug!(
                        document = %document.id,
                        index,
                        kind = image.kind(),
                        value = %image.to_json(),
                        legacy = is_legacy_value(image),
                        "images entry"
                    );
                }
            }
        } else {
            info!(document = %document.id, legacy_urls = legacy_urls.len(), "found legacy URLs");
            for legacy in &legacy_urls {
                info!(document = %document.id, field = %legacy.path, url = %legacy.url, "legacy URL");
            }
        }

        DocumentReport::analyzed(&document.id, legacy_urls)
    }

    fn log_structure(&self, document: &Document) {
        if self.config.debug {
            let structure = serde_json::to_string_pretty(&fields_to_json(&document.fields))
                .unwrap_or_default();
            debug!(document = %document.id, "document structure:\n{}", structure);
        }
    }
}
