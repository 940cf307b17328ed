//! Content digests used for change detection

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA256 digest of a schema's raw text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum of schema content exactly as it will be submitted.
    ///
    /// No normalisation happens here: whitespace changes count as changes,
    /// matching what the registry stores.
    pub fn of_content(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that content matches this checksum
    pub fn matches(&self, content: &str) -> bool {
        *self == Self::of_content(content)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let content = r#"{"type": "record", "name": "Address", "fields": []}"#;
        assert_eq!(Checksum::of_content(content), Checksum::of_content(content));
    }

    #[test]
    fn test_single_byte_changes_digest() {
        let before = Checksum::of_content(r#"{"name": "Address"}"#);
        let after = Checksum::of_content(r#"{"name": "Addresz"}"#);
        assert_ne!(before, after);
    }

    #[test]
    fn test_matches() {
        let content = "syntax = \"proto3\";";
        let checksum = Checksum::of_content(content);
        assert!(checksum.matches(content));
        assert!(!checksum.matches("syntax = \"proto2\";"));
        assert_eq!(checksum.as_str().len(), 64);
    }
}
