//! SHA-256 digest newtype.
//!
//! Evidence fingerprints and audit-chain links are both `ContentHash`
//! values. On the wire and in storage they are 64 lowercase hex digits.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const DIGEST_LEN: usize = 32;

/// 32-byte SHA-256 output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ContentHash([u8; DIGEST_LEN]);

impl ContentHash {
    /// Digest of `data`.
    #[must_use]
    pub fn hash(data: &[u8]) -> Self {
        Self::hash_multi(&[data])
    }

    /// Digest of `parts` fed back to back. `["ab", "c"]` and `["a", "bc"]`
    /// collide; callers that need field boundaries must encode them.
    #[must_use]
    pub fn hash_multi(parts: &[&[u8]]) -> Self {
        let digest = parts
            .iter()
            .fold(Sha256::new(), |hasher, part| hasher.chain_update(part))
            .finalize();
        Self(digest.into())
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Equality check whose timing does not depend on where the digests
    /// first differ.
    #[must_use]
    pub fn ct_matches(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }

    /// Lowercase hex, no prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse 64 hex digits, optionally `0x`-prefixed, in either case.
    ///
    /// # Errors
    ///
    /// Non-hex input, or a digest that is not exactly 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut out = [0u8; DIGEST_LEN];
        hex::decode_to_slice(digits, &mut out)?;
        Ok(Self(out))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "ContentHash({}..)", hex.get(..12).unwrap_or(&hex))
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for ContentHash {
    type Error = hex::FromHexError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_test_vector() {
        assert_eq!(
            ContentHash::hash(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_parts_are_concatenated_without_separator() {
        let parts: &[&[u8]] = &[b"Suspect ", b"claims", b" X"];
        assert_eq!(
            ContentHash::hash_multi(parts),
            ContentHash::hash(b"Suspect claims X")
        );
        assert_eq!(ContentHash::hash_multi(&[]), ContentHash::hash(b""));
    }

    #[test]
    fn test_ct_matches_agrees_with_eq() {
        let a = ContentHash::hash(b"post-1");
        assert!(a.ct_matches(&ContentHash::hash(b"post-1")));
        assert!(!a.ct_matches(&ContentHash::hash(b"post-2")));
    }

    #[test]
    fn test_from_hex_variants() {
        let hash = ContentHash::hash(b"evidence");
        assert_eq!(ContentHash::from_hex(&hash.to_hex()).unwrap(), hash);
        let shouty = format!("0x{}", hash.to_hex().to_uppercase());
        assert_eq!(ContentHash::from_hex(&shouty).unwrap(), hash);
        assert!(ContentHash::from_hex("abcd").is_err());
        assert!(ContentHash::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_serde_uses_hex_string() {
        let hash = ContentHash::hash(b"evidence");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hash}\""));
        assert_eq!(serde_json::from_str::<ContentHash>(&json).unwrap(), hash);
        assert!(serde_json::from_str::<ContentHash>("\"0x12\"").is_err());
    }

    #[test]
    fn test_debug_is_abbreviated() {
        let rendered = format!("{:?}", ContentHash::hash(b"abc"));
        assert_eq!(rendered, "ContentHash(ba7816bf8f01..)");
    }
}
