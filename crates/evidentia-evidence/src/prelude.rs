//! Prelude module - commonly used types for convenient import.
//!
//! Use `use evidentia_evidence::prelude::*;` to import all essential types.

// Store
pub use crate::{AnchorOutcome, EvidenceStore, EvidenceView};

// Verification
pub use crate::{ReconciliationVerifier, VerificationReport, VerificationStatus};
