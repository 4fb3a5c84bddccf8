//! Stable document identity.
//!
//! A [`Fingerprint`] is derived from the document's external name, never from
//! its bytes: the resume check must run before the file is opened, and
//! re-exported copies of the same paper (different bytes, same name) should
//! still count as already processed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Lowercase hex SHA-256 of a document name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derive the identity for a document name (usually the file name).
    pub fn from_name(name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap an identity read back from a sink.
    pub fn from_persisted(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_identity() {
        assert_eq!(
            Fingerprint::from_name("smith2021.pdf"),
            Fingerprint::from_name("smith2021.pdf")
        );
        assert_ne!(
            Fingerprint::from_name("smith2021.pdf"),
            Fingerprint::from_name("smith2022.pdf")
        );
    }

    #[test]
    fn known_digest() {
        // sha256("abc")
        assert_eq!(
            Fingerprint::from_name("abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn short_is_prefix() {
        let fp = Fingerprint::from_name("x.pdf");
        assert_eq!(fp.short().len(), 12);
        assert!(fp.as_str().starts_with(fp.short()));
        assert_eq!(Fingerprint::from_persisted("abc").short(), "abc");
    }
}
