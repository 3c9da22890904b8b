//! Content fingerprints used as the deduplication key.
//!
//! A fingerprint is the lowercase hex SHA-256 of a payload's canonical bytes:
//! - text kinds: raw UTF-8 of the plain text
//! - images: raw image bytes, before any size-policy drop
//! - file lists: sorted, newline-joined paths
//!
//! Pure computation, no error path.

use std::fmt;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{:02x}", byte));
        }
        Self(hex)
    }

    pub fn of_text(text: &str) -> Self {
        Self::of_bytes(text.as_bytes())
    }

    /// Order-independent: the same set of files always hashes the same
    pub fn of_paths(paths: &[PathBuf]) -> Self {
        let mut sorted: Vec<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        sorted.sort();
        Self::of_text(&sorted.join("\n"))
    }

    /// Rebuild from a stored hex string (database rows)
    pub(crate) fn from_stored(hex: String) -> Self {
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
