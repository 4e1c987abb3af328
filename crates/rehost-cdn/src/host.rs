//! The image host interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::HostError;

/// Delivery optimizations requested at upload time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Let the host pick the compression quality.
    pub auto_quality: bool,
    /// Let the host pick the delivery format per client.
    pub auto_format: bool,
    /// Encode as progressive where the format allows it.
    pub progressive: bool,
}

impl UploadOptions {
    /// Every optimization enabled.
    pub fn optimized() -> Self {
        Self {
            auto_quality: true,
            auto_format: true,
            progressive: true,
        }
    }

    /// Incoming transformation string, e.g. `f_auto,fl_progressive,q_auto`.
    ///
    /// Components are sorted by parameter name. `None` when nothing is enabled.
    pub fn transformation(&self) -> Option<String> {
        let parts: Vec<&str> = [
            self.auto_format.then_some("f_auto"),
            self.progressive.then_some("fl_progressive"),
            self.auto_quality.then_some("q_auto"),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(","))
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedImage {
    /// Durable HTTPS delivery URL.
    pub secure_url: String,
    /// Identifier the host stored the asset under.
    pub public_id: String,
}

/// A service that stores images and hands back public URLs.
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Store `bytes` under `public_id`.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        public_id: &str,
        options: &UploadOptions,
    ) -> Result<UploadedImage, HostError>;
}
