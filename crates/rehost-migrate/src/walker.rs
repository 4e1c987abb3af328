//! Recursive document walk that rewrites legacy URL leaves.
//!
//! A walk runs in three passes over the tree:
//!
//! 1. **collect**: depth-first, find every legacy string leaf and its path
//! 2. **migrate**: hand each one to the [`UrlMigrator`], `url_concurrency`
//!    at a time, keeping discovery order
//! 3. **rebuild**: copy the tree, substituting results in the same order
//!
//! Keys, array order and every non-legacy leaf come through untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use rehost_store::Value;
use serde::Serialize;
use tracing::debug;

use crate::classify::{is_legacy_url, looks_like_url};
use crate::{FieldPath, Tally, UrlMigrator, UrlOutcome};

/// A legacy URL and where it sits in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyUrl {
    pub path: FieldPath,
    pub url: String,
}

/// Outcome of migrating one legacy URL found by the walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlChange {
    pub path: FieldPath,
    pub url: String,
    #[serde(flatten)]
    pub outcome: UrlOutcome,
}

/// Result of walking a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Walked<T> {
    /// The rewritten copy.
    pub value: T,
    pub tally: Tally,
    /// One entry per legacy URL, in depth-first order.
    pub changes: Vec<UrlChange>,
}

/// Walks document trees and migrates the legacy URLs it finds.
#[derive(Clone)]
pub struct TreeWalker {
    migrator: Arc<dyn UrlMigrator>,
    url_concurrency: usize,
}

impl TreeWalker {
    pub fn new(migrator: Arc<dyn UrlMigrator>, url_concurrency: usize) -> Self {
        Self {
            migrator,
            url_concurrency: url_concurrency.max(1),
        }
    }

    /// Walk `value` located at `base_path` inside document `document_id`.
    pub async fn walk(&self, value: &Value, document_id: &str, base_path: &FieldPath) -> Walked<Value> {
        let mut scan = Scan::default();
        scan.value(value, base_path.clone());

        let (replacements, tally, changes) = self.migrate_all(scan, document_id).await;
        let mut replacements = replacements.into_iter();
        let value = rebuild(value, &mut replacements);

        Walked {
            value,
            tally,
            changes,
        }
    }

    /// Walk the top-level fields of a document.
    pub async fn walk_fields(
        &self,
        fields: &BTreeMap<String, Value>,
        document_id: &str,
    ) -> Walked<BTreeMap<String, Value>> {
        let mut scan = Scan::default();
        scan.map(fields, &FieldPath::root());

        let (replacements, tally, changes) = self.migrate_all(scan, document_id).await;
        let mut replacements = replacements.into_iter();
        let value = rebuild_map(fields, &mut replacements);

        Walked {
            value,
            tally,
            changes,
        }
    }

    async fn migrate_all(&self, scan: Scan, document_id: &str) -> (Vec<String>, Tally, Vec<UrlChange>) {
        let outcomes: Vec<UrlOutcome> = stream::iter(scan.found.iter())
            .map(|found| {
                debug!(document = %document_id, field = %found.path, url = %found.url, "found legacy URL");
                self.migrator.migrate(&found.url, document_id, &found.path)
            })
            .buffered(self.url_concurrency)
            .collect()
            .await;

        let mut tally = Tally {
            skipped: scan.skipped,
            ..Tally::default()
        };
        let mut replacements = Vec::with_capacity(outcomes.len());
        let mut changes = Vec::with_capacity(outcomes.len());

        for (found, outcome) in scan.found.into_iter().zip(outcomes) {
            tally += Tally::of(&outcome);
            replacements.push(outcome.resolve(&found.url));
            changes.push(UrlChange {
                path: found.path,
                url: found.url,
                outcome,
            });
        }

        (replacements, tally, changes)
    }
}

/// Every legacy URL in `value`, depth-first.
pub fn find_legacy_urls(value: &Value) -> Vec<LegacyUrl> {
    let mut scan = Scan::default();
    scan.value(value, FieldPath::root());
    scan.found
}

/// Every legacy URL in a document's top-level fields, depth-first.
pub fn find_legacy_urls_in_fields(fields: &BTreeMap<String, Value>) -> Vec<LegacyUrl> {
    let mut scan = Scan::default();
    scan.map(fields, &FieldPath::root());
    scan.found
}

#[derive(Default)]
struct Scan {
    found: Vec<LegacyUrl>,
    /// URL-shaped strings that are not legacy.
    skipped: usize,
}

impl Scan {
    fn value(&mut self, value: &Value, path: FieldPath) {
        match value {
            Value::String(s) if is_legacy_url(s) => self.found.push(LegacyUrl {
                path,
                url: s.clone(),
            }),
            Value::String(s) => {
                if looks_like_url(s) {
                    self.skipped += 1;
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.value(item, path.index(i));
                }
            }
            Value::Map(map) => self.map(map, &path),
            Value::Null
            | Value::Bool(_)
            | Value::Integer(_)
            | Value::Double(_)
            | Value::Timestamp(_)
            | Value::Reference(_)
            | Value::Bytes(_)
            | Value::GeoPoint { .. } => {}
        }
    }

    fn map(&mut self, map: &BTreeMap<String, Value>, path: &FieldPath) {
        for (key, value) in map {
            self.value(value, path.key(key));
        }
    }
}

/// Copy `value`, taking the next replacement for each legacy string leaf.
///
/// Visits leaves in the same order as [`Scan`], so replacements line up.
fn rebuild(value: &Value, replacements: &mut impl Iterator<Item = String>) -> Value {
    match value {
        Value::String(s) if is_legacy_url(s) => {
            Value::String(replacements.next().unwrap_or_else(|| s.clone()))
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| rebuild(v, replacements)).collect()),
        Value::Map(map) => Value::Map(rebuild_map(map, replacements)),
        other => other.clone(),
    }
}

fn rebuild_map(
    map: &BTreeMap<String, Value>,
    replacements: &mut impl Iterator<Item = String>,
) -> BTreeMap<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), rebuild(v, replacements)))
        .collect()
}
