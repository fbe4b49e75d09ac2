//! Evidentia Crypto - Hashing and field encryption for the integrity core.
//!
//! This crate provides:
//! - SHA-256 content hashes with hex serialization
//! - The canonical artifact fingerprint anchored to the ledger
//! - AES-256-GCM field encryption for the local mirror, with an explicit
//!   degraded mode when no key is configured
//!
//! # Example
//!
//! ```
//! use evidentia_crypto::{CanonicalHasher, ContentHash};
//!
//! let hash = CanonicalHasher::hash("Suspect claims X", "user1", "100", "2024-01-01T00:00:00")
//!     .unwrap();
//! assert_eq!(hash, ContentHash::hash(b"Suspect claims Xuser11002024-01-01T00:00:00"));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod canonical;
mod cipher;
mod error;
mod hash;

pub use canonical::CanonicalHasher;
pub use cipher::{AesFieldCipher, FieldCipher, FieldKey, KEY_LEN, NONCE_LEN};
pub use error::{CryptoError, CryptoResult};
pub use hash::ContentHash;
