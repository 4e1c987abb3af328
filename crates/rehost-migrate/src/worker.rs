//! Per-URL migration: download, re-upload, hand back the new URL.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rehost_cdn::{ImageHost, UploadOptions};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::{extract_extension, is_legacy_url};
use crate::fetch::ImageFetcher;
use crate::{FieldPath, MigrateError, MigrationConfig};

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;

/// What happened to one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UrlOutcome {
    /// Re-hosted; the document should point at `new_url`.
    Migrated { new_url: String },
    /// Not a legacy URL; left alone.
    Skipped,
    /// Migration failed; the original URL stays in place.
    Failed { reason: String },
}

impl UrlOutcome {
    /// The URL the document should hold after this outcome.
    pub fn resolve(&self, original: &str) -> String {
        match self {
            UrlOutcome::Migrated { new_url } => new_url.clone(),
            UrlOutcome::Skipped | UrlOutcome::Failed { .. } => original.to_string(),
        }
    }
}

/// Something that can move one URL to the new host.
///
/// Implementations never fail: any problem is reported as
/// [`UrlOutcome::Failed`] and the caller keeps the original URL.
#[async_trait]
pub trait UrlMigrator: Send + Sync {
    async fn migrate(&self, url: &str, document_id: &str, field_path: &FieldPath) -> UrlOutcome;
}

/// Downloads legacy images and uploads them to an [`ImageHost`].
pub struct MigrationWorker {
    fetcher: ImageFetcher,
    host: Arc<dyn ImageHost>,
    namespace: String,
    options: UploadOptions,
}

impl MigrationWorker {
    pub fn new(config: &MigrationConfig, host: Arc<dyn ImageHost>) -> Result<Self, MigrateError> {
        let fetcher = ImageFetcher::new(config)
            .map_err(|e| MigrateError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            fetcher,
            host,
            namespace: config.namespace.trim_matches('/').to_string(),
            options: UploadOptions::optimized(),
        })
    }

    async fn rehost(
        &self,
        url: &str,
        document_id: &str,
        field_path: &FieldPath,
    ) -> Result<String, String> {
        let image = self.fetcher.fetch(url).await.map_err(|e| e.to_string())?;
        debug!(
            url = %url,
            size = image.bytes.len(),
            content_type = %image.content_type,
            extension = %extract_extension(&image.final_url),
            "downloaded image"
        );

        let public_id = upload_id(
            &self.namespace,
            document_id,
            field_path,
            Utc::now().timestamp_millis(),
        );
        debug!(public_id = %public_id, "uploading image");

        let uploaded = self
            .host
            .upload(image.bytes, &image.content_type, &public_id, &self.options)
            .await
            .map_err(|e| e.to_string())?;

        Ok(uploaded.secure_url)
    }
}

#[async_trait]
impl UrlMigrator for MigrationWorker {
    async fn migrate(&self, url: &str, document_id: &str, field_path: &FieldPath) -> UrlOutcome {
        if !is_legacy_url(url) {
            debug!(url = %url, document = %document_id, field = %field_path, "skipping non-legacy URL");
            return UrlOutcome::Skipped;
        }

        match self.rehost(url, document_id, field_path).await {
            Ok(new_url) => {
                info!(
                    document = %document_id,
                    field = %field_path,
                    old_url = %url,
                    new_url = %new_url,
                    "migrated image"
                );
                UrlOutcome::Migrated { new_url }
            }
            Err(reason) => {
                warn!(
                    document = %document_id,
                    field = %field_path,
                    url = %url,
                    error = %reason,
                    "failed to migrate image, keeping original URL"
                );
                UrlOutcome::Failed { reason }
            }
        }
    }
}

/// Unique upload identifier: `{namespace}/{document}/{field}/{millis}_{suffix}`.
pub fn upload_id(namespace: &str, document_id: &str, field_path: &FieldPath, millis: i64) -> String {
    format!(
        "{}/{}/{}/{}_{}",
        namespace,
        document_id,
        field_path,
        millis,
        random_suffix()
    )
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rehost_cdn::{HostError, UploadedImage};
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingHost {
        uploads: Mutex<Vec<(String, String, usize)>>,
        fail: bool,
    }

    #[async_trait]
    impl ImageHost for RecordingHost {
        async fn upload(
            &self,
            bytes: Vec<u8>,
            content_type: &str,
            public_id: &str,
            options: &UploadOptions,
        ) -> Result<UploadedImage, HostError> {
            assert_eq!(*options, UploadOptions::optimized());
            self.uploads.lock().unwrap().push((
                public_id.to_string(),
                content_type.to_string(),
                bytes.len(),
            ));
            if self.fail {
                return Err(HostError::Api {
                    status: 400,
                    message: "Invalid image file".to_string(),
                });
            }
            Ok(UploadedImage {
                secure_url: format!("https://res.cloudinary.com/demo/image/upload/{}", public_id),
                public_id: public_id.to_string(),
            })
        }
    }

    fn worker(host: Arc<RecordingHost>, config: MigrationConfig) -> MigrationWorker {
        MigrationWorker::new(&config, host).unwrap()
    }

    async fn image_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(path("/mybucket.s3.amazonaws.com/a.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1, 2, 3, 4], "image/png"))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_upload_id_shape() {
        let id = upload_id("migrated", "doc-1", &FieldPath::from("images[0]"), 1700000000123);
        let (prefix, suffix) = id.rsplit_once('_').unwrap();
        assert_eq!(prefix, "migrated/doc-1/images[0]/1700000000123");
        assert_eq!(suffix.len(), 6);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn test_upload_ids_are_unique() {
        let path = FieldPath::from("image");
        let ids: std::collections::HashSet<String> =
            (0..50).map(|_| upload_id("migrated", "d", &path, 1)).collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_resolve() {
        let migrated = UrlOutcome::Migrated {
            new_url: "https://new".to_string(),
        };
        let failed = UrlOutcome::Failed {
            reason: "x".to_string(),
        };
        assert_eq!(migrated.resolve("https://old"), "https://new");
        assert_eq!(failed.resolve("https://old"), "https://old");
        assert_eq!(UrlOutcome::Skipped.resolve("https://old"), "https://old");
    }

    #[tokio::test]
    async fn test_non_legacy_url_is_skipped_without_io() {
        let host = Arc::new(RecordingHost::default());
        let worker = worker(host.clone(), MigrationConfig::default());

        let outcome = worker
            .migrate("https://cdn.example.com/b.jpg", "doc-1", &FieldPath::from("images[1]"))
            .await;

        assert_eq!(outcome, UrlOutcome::Skipped);
        assert!(host.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_migrates_legacy_url() {
        let server = image_server().await;
        let host = Arc::new(RecordingHost::default());
        let worker = worker(host.clone(), MigrationConfig::default());
        let url = format!("{}/mybucket.s3.amazonaws.com/a.png", server.uri());
        let before = Utc::now().timestamp_millis();

        let outcome = worker
            .migrate(&url, "doc-1", &FieldPath::from("images[0]"))
            .await;

        let UrlOutcome::Migrated { new_url } = outcome else {
            panic!("expected migration, got {:?}", outcome);
        };
        assert!(new_url.starts_with("https://res.cloudinary.com/demo/image/upload/migrated/doc-1/images[0]/"));

        let uploads = host.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1, "image/png");
        assert_eq!(uploads[0].2, 4);

        let stamp = uploads[0].0.rsplit('/').next().unwrap();
        let millis: i64 = stamp.split('_').next().unwrap().parse().unwrap();
        assert!(millis >= before && millis <= Utc::now().timestamp_millis());
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_original() {
        let server = image_server().await;
        let host = Arc::new(RecordingHost {
            fail: true,
            ..Default::default()
        });
        let worker = worker(host, MigrationConfig::default());
        let url = format!("{}/mybucket.s3.amazonaws.com/a.png", server.uri());

        let outcome = worker.migrate(&url, "doc-1", &FieldPath::from("image")).await;

        assert!(matches!(outcome, UrlOutcome::Failed { ref reason } if reason.contains("Invalid image file")));
        assert_eq!(outcome.resolve(&url), url);
    }

    #[tokio::test]
    async fn test_download_timeout_keeps_original() {
        let server = MockServer::start().await;
        Mock::given(path("/mybucket.s3.amazonaws.com/slow.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(vec![1], "image/jpeg")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        let host = Arc::new(RecordingHost::default());
        let worker = worker(
            host.clone(),
            MigrationConfig::default().with_download_timeout(Duration::from_millis(100)),
        );
        let url = format!("{}/mybucket.s3.amazonaws.com/slow.jpg", server.uri());

        let outcome = worker.migrate(&url, "doc-1", &FieldPath::from("image")).await;

        assert!(matches!(outcome, UrlOutcome::Failed { .. }));
        assert!(host.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_legacy_host_fails_open() {
        let host = Arc::new(RecordingHost::default());
        let worker = worker(host, MigrationConfig::default());
        let url = "http://127.0.0.1:1/mybucket.s3.amazonaws.com/a.jpg";

        let outcome = worker.migrate(url, "doc-1", &FieldPath::from("image")).await;

        assert!(matches!(outcome, UrlOutcome::Failed { .. }));
        assert_eq!(outcome.resolve(url), url);
    }
}
