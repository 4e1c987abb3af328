//! Run results and the end-of-run summary.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::walker::{LegacyUrl, UrlChange};
use crate::{MigrateError, RunMode, Tally};

/// What happened to one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// At least one field was rewritten and persisted.
    Updated,
    /// Nothing to write: no legacy URLs, or every migration failed.
    Unchanged,
    /// Only counted (dry-run).
    Analyzed,
    /// The store could not decode it, or the write-back failed.
    Failed,
}

/// Per-document result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentReport {
    pub id: String,
    pub status: DocumentStatus,
    /// Legacy URLs present before processing.
    pub legacy_urls: Vec<LegacyUrl>,
    pub tally: Tally,
    /// Top-level fields included in the write.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<UrlChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentReport {
    /// A document that was counted but not touched.
    pub fn analyzed(id: impl Into<String>, legacy_urls: Vec<LegacyUrl>) -> Self {
        Self {
            id: id.into(),
            status: DocumentStatus::Analyzed,
            legacy_urls,
            tally: Tally::default(),
            changed_fields: Vec::new(),
            changes: Vec::new(),
            error: None,
        }
    }

    /// A document the store listed but could not decode.
    pub fn rejected(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: DocumentStatus::Failed,
            tally: Tally::errored(),
            error: Some(error.into()),
            ..Self::analyzed(id, Vec::new())
        }
    }

    pub fn unchanged(id: impl Into<String>, legacy_urls: Vec<LegacyUrl>, tally: Tally) -> Self {
        Self {
            status: DocumentStatus::Unchanged,
            tally,
            ..Self::analyzed(id, legacy_urls)
        }
    }
}

/// Per-collection result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionReport {
    pub name: String,
    /// Records returned by the store listing, including undecodable ones.
    pub documents_listed: usize,
    /// Set when the collection could not be listed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub documents: Vec<DocumentReport>,
}

impl CollectionReport {
    pub fn new(name: impl Into<String>, documents_listed: usize) -> Self {
        Self {
            name: name.into(),
            documents_listed,
            error: None,
            documents: Vec::new(),
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(name, 0)
        }
    }

    pub fn tally(&self) -> Tally {
        self.documents.iter().map(|d| d.tally).sum()
    }

    pub fn count(&self, status: DocumentStatus) -> usize {
        self.documents.iter().filter(|d| d.status == status).count()
    }

    pub fn legacy_urls(&self) -> usize {
        self.documents.iter().map(|d| d.legacy_urls.len()).sum()
    }
}

/// Everything a run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub collections: Vec<CollectionReport>,
}

impl RunReport {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn tally(&self) -> Tally {
        self.collections.iter().map(CollectionReport::tally).sum()
    }

    /// Documents examined across every collection.
    pub fn documents(&self) -> usize {
        self.collections.iter().map(|c| c.documents.len()).sum()
    }

    pub fn count(&self, status: DocumentStatus) -> usize {
        self.collections.iter().map(|c| c.count(status)).sum()
    }

    pub fn legacy_urls(&self) -> usize {
        self.collections.iter().map(CollectionReport::legacy_urls).sum()
    }

    /// Names of collections that could not be listed.
    pub fn failed_collections(&self) -> Vec<&str> {
        self.collections
            .iter()
            .filter(|c| c.error.is_some())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Human-readable summary, one line per entry.
    pub fn summary_lines(&self) -> Vec<String> {
        let elapsed = self.elapsed().num_milliseconds() as f64 / 1000.0;
        let mut lines = Vec::new();

        if self.mode == RunMode::DryRun {
            lines.push("Dry run summary:".to_string());
            lines.push(format!("  Documents analyzed: {}", self.documents()));
            lines.push(format!("  Legacy URLs found:  {}", self.legacy_urls()));
            for collection in &self.collections {
                if collection.error.is_none() {
                    lines.push(format!(
                        "  {}: {} document(s), {} legacy URL(s)",
                        collection.name,
                        collection.documents.len(),
                        collection.legacy_urls()
                    ));
                }
            }
        } else {
            let tally = self.tally();
            lines.push("Migration summary:".to_string());
            lines.push(format!("  Processed:          {}", tally.processed));
            lines.push(format!("  Skipped:            {}", tally.skipped));
            lines.push(format!("  Errors:             {}", tally.errored));
            lines.push(format!(
                "  Documents updated:  {}",
                self.count(DocumentStatus::Updated)
            ));
            lines.push(format!(
                "  Documents failed:   {}",
                self.count(DocumentStatus::Failed)
            ));
        }

        let failed = self.failed_collections();
        if !failed.is_empty() {
            lines.push(format!("  Failed collections: {}", failed.join(", ")));
        }
        lines.push(format!("  Elapsed:            {:.1}s", elapsed));
        lines
    }

    pub fn print_summary(&self) {
        println!();
        for line in self.summary_lines() {
            println!("{}", line);
        }
    }

    /// Write the report as pretty JSON.
    pub async fn write_json(&self, path: &Path) -> Result<(), MigrateError> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldPath;

    fn legacy(path: &str) -> LegacyUrl {
        LegacyUrl {
            path: FieldPath::from(path),
            url: format!("https://b.s3.amazonaws.com/{}.jpg", path),
        }
    }

    fn report(mode: RunMode, collections: Vec<CollectionReport>) -> RunReport {
        let started_at = Utc::now();
        RunReport {
            mode,
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(1500),
            collections,
        }
    }

    #[test]
    fn test_totals() {
        let mut products = CollectionReport::new("products", 3);
        products.documents.push(DocumentReport {
            status: DocumentStatus::Updated,
            tally: Tally {
                processed: 2,
                skipped: 1,
                errored: 0,
            },
            ..DocumentReport::analyzed("a", vec![legacy("x"), legacy("y")])
        });
        products
            .documents
            .push(DocumentReport::unchanged("b", vec![], Tally::default()));
        products.documents.push(DocumentReport {
            status: DocumentStatus::Failed,
            tally: Tally::errored(),
            ..DocumentReport::analyzed("c", vec![legacy("z")])
        });

        let run = report(
            RunMode::Normal,
            vec![products, CollectionReport::failed("orders", "unavailable")],
        );

        assert_eq!(
            run.tally(),
            Tally {
                processed: 2,
                skipped: 1,
                errored: 1
            }
        );
        assert_eq!(run.documents(), 3);
        assert_eq!(run.legacy_urls(), 3);
        assert_eq!(run.count(DocumentStatus::Updated), 1);
        assert_eq!(run.count(DocumentStatus::Failed), 1);
        assert_eq!(run.failed_collections(), vec!["orders"]);

        let lines = run.summary_lines();
        assert!(lines.contains(&"  Processed:          2".to_string()));
        assert!(lines.contains(&"  Failed collections: orders".to_string()));
        assert!(lines.contains(&"  Elapsed:            1.5s".to_string()));
    }

    #[test]
    fn test_dry_run_summary() {
        let mut products = CollectionReport::new("products", 2);
        products
            .documents
            .push(DocumentReport::analyzed("a", vec![legacy("x")]));
        products.documents.push(DocumentReport::analyzed("b", vec![]));

        let lines = report(RunMode::DryRun, vec![products]).summary_lines();

        assert_eq!(lines[0], "Dry run summary:");
        assert!(lines.contains(&"  Documents analyzed: 2".to_string()));
        assert!(lines.contains(&"  Legacy URLs found:  1".to_string()));
    }

    #[tokio::test]
    async fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut products = CollectionReport::new("products", 1);
        products
            .documents
            .push(DocumentReport::analyzed("a", vec![legacy("images[0]")]));

        report(RunMode::DryRun, vec![products])
            .write_json(&path)
            .await
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["mode"], "dry-run");
        assert_eq!(json["collections"][0]["name"], "products");
        assert_eq!(
            json["collections"][0]["documents"][0]["legacy_urls"][0]["path"],
            "images[0]"
        );
        assert_eq!(json["collections"][0]["documents"][0]["status"], "analyzed");
        assert!(json["collections"][0].get("error").is_none());
    }
}
