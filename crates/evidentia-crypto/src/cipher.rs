//! Field-level encryption for the local mirror.
//!
//! Blobs are `base64(nonce || ciphertext || tag)` with a fresh random
//! 12-byte nonce per call. Without a key the cipher runs in degraded mode
//! and both directions are the identity; construction logs that loudly.

use std::fmt;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, error, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Encrypts and decrypts individual string fields.
///
/// Implemented by [`AesFieldCipher`]; tests substitute their own.
pub trait FieldCipher: Send + Sync {
    /// Encrypt a field for storage.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if the cipher rejects the
    /// input.
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String>;

    /// Decrypt a stored field. Values that do not parse as a blob under the
    /// current key (legacy plaintext, a rotated key) come back unchanged.
    fn decrypt(&self, blob: &str) -> String;

    /// Whether the cipher is passing values through unencrypted.
    fn is_degraded(&self) -> bool;
}

/// A 256-bit field encryption key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FieldKey([u8; KEY_LEN]);

impl FieldKey {
    /// Generate a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] unless `bytes` is exactly
    /// 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let array = <[u8; KEY_LEN]>::try_from(bytes).map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// Parse the 64-character hex form.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidHexEncoding`] or
    /// [`CryptoError::InvalidKeyLength`].
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let mut bytes = hex::decode(s.trim()).map_err(|_| CryptoError::InvalidHexEncoding)?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Render as 64 lowercase hex characters.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldKey([REDACTED])")
    }
}

/// AES-256-GCM field cipher.
pub struct AesFieldCipher {
    cipher: Option<Aes256Gcm>,
}

impl AesFieldCipher {
    /// Build a cipher from an optional key. `None` selects degraded mode.
    #[must_use]
    pub fn new(key: Option<&FieldKey>) -> Self {
        match key {
            Some(key) => Self {
                cipher: Some(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0))),
            },
            None => {
                warn!(
                    "No field encryption key configured; mirror fields will be stored in plaintext"
                );
                Self { cipher: None }
            },
        }
    }

    /// Build from the configured hex key. A missing or malformed key
    /// degrades to identity mode instead of failing.
    #[must_use]
    pub fn from_hex_key(key_hex: Option<&str>) -> Self {
        match key_hex.map(FieldKey::from_hex) {
            Some(Ok(key)) => Self::new(Some(&key)),
            Some(Err(e)) => {
                error!(error = %e, "Invalid field encryption key; falling back to plaintext storage");
                Self::new(None)
            },
            None => Self::new(None),
        }
    }

    fn try_decrypt(cipher: &Aes256Gcm, blob: &str) -> Option<String> {
        let raw = STANDARD.decode(blob).ok()?;
        if raw.len() < NONCE_LEN.saturating_add(TAG_LEN) {
            return None;
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .ok()?;
        String::from_utf8(plaintext).ok()
    }
}

impl FieldCipher for AesFieldCipher {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let Some(cipher) = &self.cipher else {
            return Ok(plaintext.to_string());
        };

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN.saturating_add(ciphertext.len()));
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    fn decrypt(&self, blob: &str) -> String {
        let Some(cipher) = &self.cipher else {
            return blob.to_string();
        };

        Self::try_decrypt(cipher, blob).unwrap_or_else(|| {
            debug!("Field did not decrypt under the current key; returning it unchanged");
            blob.to_string()
        })
    }

    fn is_degraded(&self) -> bool {
        self.cipher.is_none()
    }
}

impl fmt::Debug for AesFieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesFieldCipher")
            .field("degraded", &self.cipher.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed() -> AesFieldCipher {
        AesFieldCipher::new(Some(&FieldKey::generate()))
    }

    #[test]
    fn test_round_trip_with_key() {
        let cipher = keyed();
        for text in ["", "hello", "ünïcødé ✓ 证据", "line\nbreak"] {
            let blob = cipher.encrypt(text).unwrap();
            assert_ne!(blob, text);
            assert_eq!(cipher.decrypt(&blob), text);
        }
    }

    #[test]
    fn test_decrypt_then_encrypt_preserves_plaintext() {
        let cipher = keyed();
        let blob = cipher.encrypt("evidence").unwrap();
        let again = cipher.encrypt(&cipher.decrypt(&blob)).unwrap();
        assert_eq!(cipher.decrypt(&again), cipher.decrypt(&blob));
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let cipher = keyed();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);

        let raw = STANDARD.decode(&a).unwrap();
        assert_eq!(raw.len(), NONCE_LEN + "same".len() + TAG_LEN);
    }

    #[test]
    fn test_degraded_mode_is_identity() {
        let cipher = AesFieldCipher::new(None);
        assert!(cipher.is_degraded());
        assert_eq!(cipher.encrypt("plain").unwrap(), "plain");
        assert_eq!(cipher.decrypt("plain"), "plain");
    }

    #[test]
    fn test_legacy_plaintext_passes_through() {
        let cipher = keyed();
        assert_eq!(cipher.decrypt("not base64 at all!"), "not base64 at all!");
        assert_eq!(cipher.decrypt("c2hvcnQ="), "c2hvcnQ=");
    }

    #[test]
    fn test_wrong_key_and_tampering_pass_through() {
        let blob = keyed().encrypt("secret").unwrap();
        let other = keyed();
        assert_eq!(other.decrypt(&blob), blob);

        let cipher = keyed();
        let blob = cipher.encrypt("secret").unwrap();
        let mut raw = STANDARD.decode(&blob).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = STANDARD.encode(raw);
        assert_eq!(cipher.decrypt(&tampered), tampered);
    }

    #[test]
    fn test_key_hex_parsing() {
        let key = FieldKey::generate();
        let parsed = FieldKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(parsed.to_hex(), key.to_hex());

        assert!(matches!(
            FieldKey::from_hex("zz"),
            Err(CryptoError::InvalidHexEncoding)
        ));
        assert!(matches!(
            FieldKey::from_hex("abcd"),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_malformed_hex_key_degrades() {
        assert!(AesFieldCipher::from_hex_key(Some("nope")).is_degraded());
        assert!(AesFieldCipher::from_hex_key(None).is_degraded());
        let key = FieldKey::generate().to_hex();
        assert!(!AesFieldCipher::from_hex_key(Some(&key)).is_degraded());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        assert_eq!(format!("{:?}", FieldKey::generate()), "FieldKey([REDACTED])");
    }
}
