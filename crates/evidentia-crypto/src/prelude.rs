//! Prelude module - commonly used types for convenient import.
//!
//! Use `use evidentia_crypto::prelude::*;` to import all essential types.

// Errors
pub use crate::{CryptoError, CryptoResult};

// Hashing
pub use crate::{CanonicalHasher, ContentHash};

// Field encryption
pub use crate::{AesFieldCipher, FieldCipher, FieldKey};
