//! The canonical artifact fingerprint.

use evidentia_core::CapturedArtifact;

use crate::error::{CryptoError, CryptoResult};
use crate::hash::ContentHash;

/// Deterministic fingerprint over an artifact's defining fields.
///
/// The digest is SHA-256 of `content + author_handle + post_id + timestamp`
/// as raw UTF-8, with no separators and no normalisation of any kind. Other
/// implementations reproduce it byte for byte, so nothing here may trim,
/// case-fold or re-encode.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalHasher;

impl CanonicalHasher {
    /// Fingerprint the four defining fields.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EmptyField`] if any field is empty.
    pub fn hash(
        content: &str,
        author_handle: &str,
        post_id: &str,
        timestamp: &str,
    ) -> CryptoResult<ContentHash> {
        for (name, value) in [
            ("content", content),
            ("author_handle", author_handle),
            ("post_id", post_id),
            ("timestamp", timestamp),
        ] {
            if value.is_empty() {
                return Err(CryptoError::EmptyField(name));
            }
        }

        Ok(ContentHash::hash_multi(&[
            content.as_bytes(),
            author_handle.as_bytes(),
            post_id.as_bytes(),
            timestamp.as_bytes(),
        ]))
    }

    /// Fingerprint a validated artifact using its canonical timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EmptyField`] if any field is empty.
    pub fn hash_artifact(artifact: &CapturedArtifact) -> CryptoResult<ContentHash> {
        Self::hash(
            &artifact.content,
            &artifact.author_handle,
            artifact.post_id.as_str(),
            artifact.timestamp.as_str(),
        )
    }
}
