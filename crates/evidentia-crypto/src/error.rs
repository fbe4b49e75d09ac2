//! Cryptographic error types.

use evidentia_core::EvidenceError;
use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A field that participates in the canonical hash was empty.
    #[error("canonical hash field '{0}' must not be empty")]
    EmptyField(&'static str),

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// Invalid hex encoding.
    #[error("invalid hex encoding")]
    InvalidHexEncoding,

    /// The cipher refused to encrypt.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<CryptoError> for EvidenceError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::EmptyField(_) => Self::Validation(err.to_string()),
            CryptoError::InvalidKeyLength { .. } | CryptoError::InvalidHexEncoding => {
                Self::Configuration(err.to_string())
            },
            CryptoError::EncryptionFailed(_) => Self::Crypto(err.to_string()),
        }
    }
}
