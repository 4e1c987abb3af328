//! Documents and the store interface the migration talks to.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{StoreError, Value};

/// One record of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Identifier, unique within its collection.
    pub id: String,
    /// Full resource name used by the backend to address the record.
    pub name: String,
    /// Top-level fields.
    pub fields: BTreeMap<String, Value>,
}

impl Document {
    /// Create a document whose resource name is `{collection}/{id}`.
    pub fn new(
        collection: &str,
        id: impl Into<String>,
        fields: BTreeMap<String, Value>,
    ) -> Self {
        let id = id.into();
        Self {
            name: format!("{}/{}", collection, id),
            id,
            fields,
        }
    }

    /// Replace the fields, keeping identity.
    pub fn with_fields(&self, fields: BTreeMap<String, Value>) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            fields,
        }
    }
}

/// A record the store returned but could not decode.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedDocument {
    pub id: String,
    pub error: String,
}

/// One collection as returned by a store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub documents: Vec<Document>,
    /// Records skipped because their fields could not be decoded.
    pub rejected: Vec<RejectedDocument>,
}

impl Listing {
    /// Records the store returned, decodable or not.
    pub fn total(&self) -> usize {
        self.documents.len() + self.rejected.len()
    }
}

/// Top-level keys whose values differ between `original` and `updated`.
///
/// Keys present on only one side are included as well.
pub fn changed_fields(
    original: &BTreeMap<String, Value>,
    updated: &BTreeMap<String, Value>,
) -> Vec<String> {
    let mut keys: Vec<String> = original
        .iter()
        .filter(|(k, v)| updated.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    keys.extend(
        updated
            .keys()
            .filter(|k| !original.contains_key(*k))
            .cloned(),
    );
    keys
}

/// A document database the migration can read and write.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch every document of a collection.
    ///
    /// A record that cannot be decoded is reported in [`Listing::rejected`]
    /// instead of failing the whole listing.
    async fn list_documents(&self, collection: &str) -> Result<Listing, StoreError>;

    /// Write back the fields named in `update_mask`.
    ///
    /// Fields outside the mask are left untouched on the server.
    async fn update_document(
        &self,
        collection: &str,
        document: &Document,
        update_mask: &[String],
    ) -> Result<(), StoreError>;
}
