//! Firestore REST v1 client.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::wire::{
    self, ApiErrorEnvelope, ListDocumentsResponse, RawDocument, decode_fields, encode_fields,
};
use crate::{Document, DocumentStore, Listing, RejectedDocument, StoreError, Value};

/// Production API endpoint.
pub const FIRESTORE_API_URL: &str = "https://firestore.googleapis.com/v1";

/// Database used when none is configured.
pub const DEFAULT_DATABASE: &str = "(default)";

/// Documents requested per list page.
const PAGE_SIZE: u32 = 300;

/// Attempts per request: initial + 3 retries.
const MAX_ATTEMPTS: u32 = 4;

/// Client for the Firestore REST API.
pub struct FirestoreClient {
    http: Client,
    base_url: String,
    project_id: String,
    database: String,
    access_token: Option<String>,
    retry_base: Duration,
}

impl FirestoreClient {
    /// Create a client for the hosted API.
    pub fn new(
        project_id: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self, StoreError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: FIRESTORE_API_URL.to_string(),
            project_id: project_id.into(),
            database: DEFAULT_DATABASE.to_string(),
            access_token,
            retry_base: Duration::from_millis(500),
        })
    }

    /// Create a client for a local emulator (`host:port`), which needs no token.
    pub fn emulator(host: &str, project_id: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self::new(project_id, None)?.with_base_url(format!("http://{}/v1", host)))
    }

    /// Point the client at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a named database instead of `(default)`.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Change the base retry delay (doubled per attempt).
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    /// Get the API root.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resource name of the documents root.
    pub fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database
        )
    }

    /// Fetch one page of a collection.
    pub async fn list_page(
        &self,
        collection: &str,
        page_token: Option<&str>,
    ) -> Result<ListDocumentsResponse, StoreError> {
        let url = format!("{}/{}/{}", self.base_url, self.documents_root(), collection);

        self.execute("list_documents", || {
            let mut query: Vec<(&str, String)> = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(token) = page_token {
                query.push(("pageToken", token.to_string()));
            }
            self.http.get(&url).query(&query)
        })
        .await
    }

    /// Patch the masked fields of an existing document.
    pub async fn patch_document(
        &self,
        collection: &str,
        document: &Document,
        update_mask: &[String],
    ) -> Result<RawDocument, StoreError> {
        let url = format!("{}/{}", self.base_url, self.resource_name(collection, document));

        let masked: BTreeMap<String, Value> = document
            .fields
            .iter()
            .filter(|(k, _)| update_mask.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let body = serde_json::json!({ "fields": encode_fields(&masked) });

        let mut query: Vec<(&str, String)> = update_mask
            .iter()
            .map(|field| ("updateMask.fieldPaths", wire::quote_field_path(field)))
            .collect();
        query.push(("currentDocument.exists", "true".to_string()));

        debug!(
            collection,
            id = %document.id,
            fields = ?update_mask,
            "patching document"
        );

        let result = self
            .execute("update_document", || {
                self.http.patch(&url).query(&query).json(&body)
            })
            .await;

        match result {
            Err(StoreError::Api { status: 404, .. }) => Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: document.id.clone(),
            }),
            other => other,
        }
    }

    /// Resolve the resource name to patch.
    ///
    /// Documents listed from the API carry a full name; hand-built ones only
    /// carry `collection/id`.
    fn resource_name(&self, collection: &str, document: &Document) -> String {
        if document.name.starts_with("projects/") {
            document.name.clone()
        } else {
            format!("{}/{}/{}", self.documents_root(), collection, document.id)
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request, retrying transient failures with exponential backoff.
    async fn execute<T, F>(&self, op: &'static str, build: F) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let build = &build;
        retry(op, self.retry_base, move || async move {
            match self.authorize(build()).send().await {
                Ok(response) => handle_response(response).await,
                Err(e) => Err(StoreError::from(e)),
            }
        })
        .await
    }
}

/// Run `attempt` up to [`MAX_ATTEMPTS`] times while it fails transiently.
async fn retry<T, F, Fut>(op: &'static str, base: Duration, mut attempt: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut tries = 0;
    loop {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && tries + 1 < MAX_ATTEMPTS => {
                let backoff = base * (1 << tries);
                warn!(
                    attempt = tries + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "transient error in {}, retrying",
                    op
                );
                tokio::time::sleep(backoff).await;
                tries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Handle HTTP response and parse JSON.
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());
        return Err(StoreError::RateLimited { retry_after_secs });
    }

    if !status.is_success() {
        let text = response.text().await.map_err(|e| {
            StoreError::InvalidResponse(format!(
                "request failed ({}): failed to read response: {}",
                status, e
            ))
        })?;

        let message = match serde_json::from_str::<ApiErrorEnvelope>(&text) {
            Ok(envelope) => match envelope.error.status {
                Some(code) => format!("{}: {}", code, envelope.error.message),
                None => envelope.error.message,
            },
            Err(_) => text,
        };

        return Err(StoreError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response.json().await?)
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn list_documents(&self, collection: &str) -> Result<Listing, StoreError> {
        let mut listing = Listing::default();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(collection, page_token.as_deref()).await?;

            for raw in page.documents {
                let id = wire::document_id(&raw.name).to_string();
                match decode_fields(&raw.fields) {
                    Ok(fields) => listing.documents.push(Document {
                        id,
                        name: raw.name,
                        fields,
                    }),
                    Err(e) => {
                        warn!(collection, document = %id, error = %e, "skipping undecodable document");
                        listing.rejected.push(RejectedDocument {
                            id,
                            error: e.to_string(),
                        });
                    }
                }
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(
            collection,
            count = listing.documents.len(),
            rejected = listing.rejected.len(),
            "listed documents"
        );
        Ok(listing)
    }

    async fn update_document(
        &self,
        collection: &str,
        document: &Document,
        update_mask: &[String],
    ) -> Result<(), StoreError> {
        if update_mask.is_empty() {
            return Ok(());
        }
        self.patch_document(collection, document, update_mask)
            .await
            .map(|_| ())
    }
}
