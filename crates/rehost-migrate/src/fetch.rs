//! Image downloads with bounded manual redirect following.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, StatusCode, redirect};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::MigrationConfig;

/// Why a download was rejected.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("expected an image but got content type {content_type:?}")]
    ContentType { content_type: String },

    #[error("gave up after {0} redirects")]
    TooManyRedirects(usize),

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
}

/// A downloaded image held in memory.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    /// Location the bytes were finally served from.
    pub final_url: String,
}

/// HTTP downloader for legacy images.
pub struct ImageFetcher {
    http: Client,
    timeout: Duration,
    max_redirects: usize,
}

impl ImageFetcher {
    pub fn new(config: &MigrationConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(config.download_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(FetchError::Http)?;

        Ok(Self {
            http,
            timeout: config.download_timeout,
            max_redirects: config.max_redirects,
        })
    }

    /// Download `url`, following at most `max_redirects` redirects.
    ///
    /// Only a final `200 OK` with an `image/*` content type succeeds.
    pub async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let mut current = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let mut redirects = 0;

        loop {
            let response = self
                .http
                .get(current.clone())
                .send()
                .await
                .map_err(|e| self.request_error(e))?;
            let status = response.status();

            if status.is_redirection() {
                if let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                {
                    if redirects >= self.max_redirects {
                        return Err(FetchError::TooManyRedirects(self.max_redirects));
                    }
                    let next = current.join(location).map_err(|e| FetchError::InvalidUrl {
                        url: location.to_string(),
                        reason: e.to_string(),
                    })?;
                    debug!(from = %current, to = %next, "following redirect");
                    current = next;
                    redirects += 1;
                    continue;
                }
            }

            if status != StatusCode::OK {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url: current.to_string(),
                });
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if !content_type.starts_with("image/") {
                return Err(FetchError::ContentType { content_type });
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| self.request_error(e))?;

            return Ok(FetchedImage {
                bytes: bytes.to_vec(),
                content_type,
                final_url: current.to_string(),
            });
        }
    }

    fn request_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Http(e)
        }
    }
}
