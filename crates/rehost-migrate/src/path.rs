//! Field paths locating a value inside a document.

use std::fmt;

use serde::Serialize;

/// Dotted/bracketed locator such as `images[2]` or `variants.primary.url`.
///
/// The root path is empty. Keys appended to the root are bare; keys appended
/// anywhere else get a leading dot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of a map entry below this one.
    pub fn key(&self, key: &str) -> Self {
        if self.is_root() {
            Self(key.to_string())
        } else {
            Self(format!("{}.{}", self.0, key))
        }
    }

    /// Path of an array element below this one.
    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldPath {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_keys_are_bare() {
        assert_eq!(FieldPath::root().key("images").as_str(), "images");
        assert!(FieldPath::root().is_root());
    }

    #[test]
    fn test_nested_paths() {
        let path = FieldPath::root().key("variants").key("primary").key("url");
        assert_eq!(path.to_string(), "variants.primary.url");

        let path = FieldPath::root().key("variant").key("gallery").index(0);
        assert_eq!(path.to_string(), "variant.gallery[0]");

        let path = FieldPath::root().key("images").index(2).key("src");
        assert_eq!(path.to_string(), "images[2].src");
    }
}
