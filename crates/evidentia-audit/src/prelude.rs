//! Prelude module - commonly used types for convenient import.
//!
//! Use `use evidentia_audit::prelude::*;` to import all essential types.

// Errors
pub use crate::{AuditError, AuditResult};

// Chain
pub use crate::{AuditAction, AuditChain, AuditEntry};
