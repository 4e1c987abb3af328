//! Legacy URL classification.
//!
//! Classification is a plain substring test so malformed URLs still match.

use rehost_store::Value;
use url::Url;

/// Host fragments that identify the deprecated image bucket.
pub const LEGACY_HOST_PATTERNS: &[&str] = &[
    "amazonaws.com",
    "s3.",
    ".s3-",
    "niligiri-tourism.s3.amazonaws.com",
];

/// Extension used when a URL has none.
pub const DEFAULT_EXTENSION: &str = ".jpg";

/// True if the string points at the legacy bucket.
pub fn is_legacy_url(s: &str) -> bool {
    LEGACY_HOST_PATTERNS.iter().any(|p| s.contains(p))
}

/// True if the value is a string that points at the legacy bucket.
pub fn is_legacy_value(value: &Value) -> bool {
    value.as_str().is_some_and(is_legacy_url)
}

/// True for strings that look like an absolute web URL.
pub fn looks_like_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// File extension of the URL path, with the leading dot.
///
/// Falls back to [`DEFAULT_EXTENSION`] when the URL does not parse or the
/// last path segment has no extension.
pub fn extract_extension(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return DEFAULT_EXTENSION.to_string();
    };

    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => format!(".{}", ext),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}
