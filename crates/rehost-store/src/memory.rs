//! In-memory document store.
//!
//! Backs offline fixture runs and tests. Every write is recorded so callers
//! can assert on what the migration persisted.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::value::{fields_from_json, fields_to_json};
use crate::{Document, DocumentStore, Listing, RejectedDocument, StoreError, Value};

/// A write captured by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedUpdate {
    pub collection: String,
    pub id: String,
    pub update_mask: Vec<String>,
    pub fields: BTreeMap<String, Value>,
}

/// Collections held in memory, in insertion order per collection.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Vec<Document>>>,
    updates: RwLock<Vec<RecordedUpdate>>,
    failing_collections: HashSet<String>,
    failing_documents: HashSet<String>,
    undecodable_documents: HashSet<String>,
    list_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `{"collection": {"docId": {...fields}}}`.
    ///
    /// Documents are ordered by ID within each collection.
    pub fn from_json(json: serde_json::Value) -> Result<Self, StoreError> {
        let serde_json::Value::Object(collections) = json else {
            return Err(StoreError::InvalidResponse(
                "fixture root must be an object of collections".to_string(),
            ));
        };

        let mut store = BTreeMap::new();
        for (collection, docs) in collections {
            let serde_json::Value::Object(docs) = docs else {
                return Err(StoreError::InvalidResponse(format!(
                    "collection {} must be an object of documents",
                    collection
                )));
            };

            let mut documents = Vec::with_capacity(docs.len());
            for (id, data) in docs {
                let fields = fields_from_json(data).ok_or_else(|| {
                    StoreError::InvalidResponse(format!(
                        "document {}/{} must be an object",
                        collection, id
                    ))
                })?;
                documents.push(Document::new(&collection, id, fields));
            }
            documents.sort_by(|a, b| a.id.cmp(&b.id));
            store.insert(collection, documents);
        }

        Ok(Self {
            collections: RwLock::new(store),
            ..Self::default()
        })
    }

    /// Add a collection with the given `(id, fields)` documents, in order.
    ///
    /// Non-object documents are stored with no fields.
    pub fn with_collection<I>(mut self, collection: &str, documents: I) -> Self
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        let docs = documents
            .into_iter()
            .map(|(id, data)| {
                let fields = fields_from_json(data).unwrap_or_default();
                Document::new(collection, id, fields)
            })
            .collect();
        self.collections
            .get_mut()
            .insert(collection.to_string(), docs);
        self
    }

    /// Make listing this collection fail.
    pub fn fail_listing(mut self, collection: &str) -> Self {
        self.failing_collections.insert(collection.to_string());
        self
    }

    /// Make writes to this document ID fail.
    pub fn fail_updates_for(mut self, id: &str) -> Self {
        self.failing_documents.insert(id.to_string());
        self
    }

    /// Report this document ID as undecodable when listing.
    pub fn fail_decoding(mut self, id: &str) -> Self {
        self.undecodable_documents.insert(id.to_string());
        self
    }

    /// Every write received so far.
    pub async fn updates(&self) -> Vec<RecordedUpdate> {
        self.updates.read().await.clone()
    }

    /// Current state of one document.
    pub async fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id).cloned())
    }

    /// Number of `list_documents` calls received.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Dump every collection back to fixture JSON.
    pub async fn to_json(&self) -> serde_json::Value {
        let collections = self.collections.read().await;
        let mut root = serde_json::Map::new();
        for (name, docs) in collections.iter() {
            let docs: serde_json::Map<_, _> = docs
                .iter()
                .map(|d| (d.id.clone(), fields_to_json(&d.fields)))
                .collect();
            root.insert(name.clone(), serde_json::Value::Object(docs));
        }
        serde_json::Value::Object(root)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_documents(&self, collection: &str) -> Result<Listing, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_collections.contains(collection) {
            return Err(StoreError::Unavailable(format!(
                "listing {} is disabled",
                collection
            )));
        }

        let documents = self
            .collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default();

        let (rejected, documents): (Vec<_>, Vec<_>) = documents
            .into_iter()
            .partition(|d| self.undecodable_documents.contains(&d.id));

        Ok(Listing {
            documents,
            rejected: rejected
                .into_iter()
                .map(|d| RejectedDocument {
                    error: format!("document {}/{} could not be decoded", collection, d.id),
                    id: d.id,
                })
                .collect(),
        })
    }

    async fn update_document(
        &self,
        collection: &str,
        document: &Document,
        update_mask: &[String],
    ) -> Result<(), StoreError> {
        if self.failing_documents.contains(&document.id) {
            return Err(StoreError::Unavailable(format!(
                "writes to {}/{} are disabled",
                collection, document.id
            )));
        }

        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == document.id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: document.id.clone(),
            })?;

        let mut written = BTreeMap::new();
        for field in update_mask {
            match document.fields.get(field) {
                Some(value) => {
                    stored.fields.insert(field.clone(), value.clone());
                    written.insert(field.clone(), value.clone());
                }
                None => {
                    stored.fields.remove(field);
                }
            }
        }

        self.updates.write().await.push(RecordedUpdate {
            collection: collection.to_string(),
            id: document.id.clone(),
            update_mask: update_mask.to_vec(),
            fields: written,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_from_json_orders_documents_by_id() {
        let store = MemoryStore::from_json(json!({
            "products": {
                "b": {"name": "Table"},
                "a": {"name": "Chair"}
            }
        }))
        .unwrap();

        let docs = store.list_documents("products").await.unwrap().documents;
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.list_documents("nothing").await.unwrap().total(), 0);
    }

    #[test]
    fn test_from_json_rejects_bad_shapes() {
        assert!(MemoryStore::from_json(json!([])).is_err());
        assert!(MemoryStore::from_json(json!({"products": []})).is_err());
        assert!(MemoryStore::from_json(json!({"products": {"a": 1}})).is_err());
    }

    #[tokio::test]
    async fn test_update_applies_only_masked_fields() {
        let store = MemoryStore::new().with_collection(
            "products",
            vec![("a".to_string(), json!({"name": "Chair", "image": "old"}))],
        );

        let mut doc = store.document("products", "a").await.unwrap();
        doc.fields.insert("image".to_string(), Value::from("new"));
        doc.fields.insert("name".to_string(), Value::from("ignored"));

        store
            .update_document("products", &doc, &["image".to_string()])
            .await
            .unwrap();

        let stored = store.document("products", "a").await.unwrap();
        assert_eq!(stored.fields["image"], Value::from("new"));
        assert_eq!(stored.fields["name"], Value::from("Chair"));

        let updates = store.updates().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].update_mask, vec!["image"]);
    }

    #[tokio::test]
    async fn test_update_unknown_document_is_not_found() {
        let store = MemoryStore::new();
        let doc = Document::new("products", "ghost", BTreeMap::new());
        let err = store
            .update_document("products", &doc, &["x".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new()
            .with_collection("products", vec![("a".to_string(), json!({}))])
            .fail_listing("orders")
            .fail_updates_for("a");

        assert!(store.list_documents("orders").await.is_err());
        assert!(store.list_documents("products").await.unwrap().rejected.is_empty());

        let doc = store.document("products", "a").await.unwrap();
        assert!(
            store
                .update_document("products", &doc, &["x".to_string()])
                .await
                .is_err()
        );
        assert!(store.updates().await.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_documents_are_rejected() {
        let store = MemoryStore::new()
            .with_collection(
                "products",
                vec![
                    ("a".to_string(), json!({"name": "Chair"})),
                    ("b".to_string(), json!({"name": "Table"})),
                ],
            )
            .fail_decoding("a");

        let listing = store.list_documents("products").await.unwrap();
        assert_eq!(listing.total(), 2);
        assert_eq!(listing.documents[0].id, "b");
        assert_eq!(listing.rejected[0].id, "a");
    }

    #[tokio::test]
    async fn test_to_json_round_trips_fixture() {
        let fixture = json!({"products": {"a": {"images": ["x", 1]}}});
        let store = MemoryStore::from_json(fixture.clone()).unwrap();
        assert_eq!(store.to_json().await, fixture);
    }
}
