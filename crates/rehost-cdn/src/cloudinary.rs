//! Cloudinary signed upload client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{HostError, ImageHost, UploadOptions, UploadedImage};

/// Production API endpoint.
pub const CLOUDINARY_API_URL: &str = "https://api.cloudinary.com";

/// Attempts per upload: initial + 3 retries.
const MAX_ATTEMPTS: u32 = 4;

/// Parameters that travel with the upload but are never signed.
const UNSIGNED_PARAMS: &[&str] = &[
    "api_key",
    "cloud_name",
    "file",
    "resource_type",
    "signature_algorithm",
];

/// Account credentials for signed uploads.
#[derive(Clone)]
pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for CloudinaryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryCredentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Client for the Cloudinary upload API.
pub struct CloudinaryClient {
    http: Client,
    api_base: String,
    credentials: CloudinaryCredentials,
    retry_base: Duration,
}

impl CloudinaryClient {
    pub fn new(credentials: CloudinaryCredentials) -> Result<Self, HostError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            http,
            api_base: CLOUDINARY_API_URL.to_string(),
            credentials,
            retry_base: Duration::from_millis(500),
        })
    }

    /// Point the client at a different API root.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Change the base retry delay (doubled per attempt).
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    /// Upload endpoint for images.
    pub fn upload_url(&self) -> String {
        format!(
            "{}/v1_1/{}/image/upload",
            self.api_base, self.credentials.cloud_name
        )
    }

    /// Signed parameters for one upload, including `signature`.
    fn signed_params(
        &self,
        public_id: &str,
        options: &UploadOptions,
        timestamp: i64,
    ) -> BTreeMap<&'static str, String> {
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.to_string());
        params.insert("timestamp", timestamp.to_string());
        if let Some(transformation) = options.transformation() {
            params.insert("transformation", transformation);
        }

        let signature = sign(&params, &self.credentials.api_secret);
        params.insert("signature", signature);
        params.insert("signature_algorithm", "sha256".to_string());
        params.insert("api_key", self.credentials.api_key.clone());
        params
    }

    async fn upload_once(
        &self,
        params: &BTreeMap<&'static str, String>,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<UploadedImage, HostError> {
        let file = Part::bytes(bytes.to_vec())
            .file_name("upload")
            .mime_str(content_type)?;
        let form = params
            .iter()
            .fold(Form::new(), |form, (k, v)| form.text(*k, v.clone()))
            .part("file", file);

        let response = self
            .http
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await?;

        handle_response(response).await
    }
}

/// The `k=v&k=v` string Cloudinary signs, keys sorted, unsigned keys skipped.
pub fn string_to_sign(params: &BTreeMap<&'static str, String>) -> String {
    params
        .iter()
        .filter(|(k, v)| !UNSIGNED_PARAMS.contains(k) && !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// SHA-256 hex signature over the parameters followed by the API secret.
pub fn sign(params: &BTreeMap<&'static str, String>, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(string_to_sign(params).as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Error envelope returned with 4xx/5xx responses.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Handle HTTP response and parse JSON.
async fn handle_response(response: reqwest::Response) -> Result<UploadedImage, HostError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(HostError::RateLimited);
    }

    if !status.is_success() {
        let text = response.text().await.map_err(|e| {
            HostError::InvalidResponse(format!(
                "upload failed ({}): failed to read response: {}",
                status, e
            ))
        })?;
        let message = serde_json::from_str::<ErrorEnvelope>(&text)
            .map(|envelope| envelope.error.message)
            .unwrap_or(text);
        return Err(HostError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let text = response.text().await?;
    let uploaded: UploadedImage = serde_json::from_str(&text)?;
    if uploaded.secure_url.is_empty() {
        return Err(HostError::InvalidResponse(
            "upload response has an empty secure_url".to_string(),
        ));
    }
    Ok(uploaded)
}

#[async_trait]
impl ImageHost for CloudinaryClient {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        public_id: &str,
        options: &UploadOptions,
    ) -> Result<UploadedImage, HostError> {
        let params = self.signed_params(public_id, options, Utc::now().timestamp());

        let mut attempt = 0;
        loop {
            let result = self.upload_once(&params, &bytes, content_type).await;

            match result {
                Ok(uploaded) => {
                    debug!(
                        size = bytes.len(),
                        public_id = %uploaded.public_id,
                        "uploaded image"
                    );
                    return Ok(uploaded);
                }
                Err(ref e) if e.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                    let backoff = self.retry_base * (1 << attempt);
                    warn!(
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient error in upload, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> CloudinaryCredentials {
        CloudinaryCredentials {
            cloud_name: "demo".to_string(),
            api_key: "key-1".to_string(),
            api_secret: "shh".to_string(),
        }
    }

    fn client(server: &MockServer) -> CloudinaryClient {
        CloudinaryClient::new(credentials())
            .unwrap()
            .with_api_base(server.uri())
            .with_retry_base(Duration::from_millis(1))
    }

    #[test]
    fn test_string_to_sign_sorts_and_skips_unsigned() {
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1700000000".to_string());
        params.insert("public_id", "migrated/a/images[0]/1_abc".to_string());
        params.insert("api_key", "key-1".to_string());
        params.insert("transformation", "f_auto,q_auto".to_string());
        params.insert("signature_algorithm", "sha256".to_string());

        assert_eq!(
            string_to_sign(&params),
            "public_id=migrated/a/images[0]/1_abc&timestamp=1700000000&transformation=f_auto,q_auto"
        );
    }

    #[test]
    fn test_sign_is_hex_sha256_and_secret_dependent() {
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1".to_string());

        let a = sign(&params, "secret-a");
        let b = sign(&params, "secret-b");

        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_eq!(a, sign(&params, "secret-a"));
    }

    #[test]
    fn test_signed_params_contents() {
        let client = CloudinaryClient::new(credentials()).unwrap();
        let params = client.signed_params("migrated/x", &UploadOptions::optimized(), 42);

        assert_eq!(params["public_id"], "migrated/x");
        assert_eq!(params["timestamp"], "42");
        assert_eq!(params["transformation"], "f_auto,fl_progressive,q_auto");
        assert_eq!(params["api_key"], "key-1");
        assert_eq!(params["signature_algorithm"], "sha256");

        let mut unsigned = params.clone();
        unsigned.remove("signature");
        assert_eq!(params["signature"], sign(&unsigned, "shh"));
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let rendered = format!("{:?}", credentials());
        assert!(!rendered.contains("shh"));
        assert!(rendered.contains("redacted"));
    }

    #[tokio::test]
    async fn test_upload_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1_1/demo/image/upload"))
            .and(body_string_contains("migrated/doc-1/images[0]/1_abcdef"))
            .and(body_string_contains("f_auto,fl_progressive,q_auto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "public_id": "migrated/doc-1/images[0]/1_abcdef",
                "secure_url": "https://res.cloudinary.com/demo/image/upload/v1/migrated/doc-1/a.jpg",
                "bytes": 3
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uploaded = client(&server)
            .upload(
                vec![1, 2, 3],
                "image/jpeg",
                "migrated/doc-1/images[0]/1_abcdef",
                &UploadOptions::optimized(),
            )
            .await
            .unwrap();

        assert_eq!(
            uploaded.secure_url,
            "https://res.cloudinary.com/demo/image/upload/v1/migrated/doc-1/a.jpg"
        );
    }

    #[tokio::test]
    async fn test_upload_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Invalid Signature"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .upload(vec![0], "image/png", "x", &UploadOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, HostError::Api { status: 401, ref message } if message == "Invalid Signature"));
    }

    #[tokio::test]
    async fn test_upload_retries_server_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "public_id": "x",
                "secure_url": "https://res.cloudinary.com/demo/x.png"
            })))
            .mount(&server)
            .await;

        let uploaded = client(&server)
            .upload(vec![0], "image/png", "x", &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(uploaded.public_id, "x");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upload_response_without_url_is_invalid() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "public_id": "x",
                "secure_url": ""
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .upload(vec![0], "image/png", "x", &UploadOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, HostError::InvalidResponse(_)));
    }
}
