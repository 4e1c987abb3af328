//! Document store access for the rehost image migration.
//!
//! This crate provides the value model the migration walks, the
//! [`DocumentStore`] interface it reads and writes through, and two
//! implementations:
//!
//! - **Firestore**: REST v1 client with typed-value codec, pagination, masked
//!   partial updates and retry on transient failures
//! - **Memory**: in-process collections seeded from JSON, used for offline
//!   fixture runs and tests

mod document;
mod error;
pub mod firestore;
pub mod memory;
mod value;
pub mod wire;

pub use document::{Document, DocumentStore, Listing, RejectedDocument, changed_fields};
pub use error::StoreError;
pub use firestore::{DEFAULT_DATABASE, FirestoreClient};
pub use memory::{MemoryStore, RecordedUpdate};
pub use value::{Value, fields_from_json, fields_to_json};
