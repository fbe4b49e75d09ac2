//! Prelude module - commonly used types for convenient import.
//!
//! Use `use evidentia_ledger::prelude::*;` to import all essential types.

// Errors
pub use crate::{LedgerError, LedgerResult};

// Protocol
pub use crate::{
    AnchoredRecord, Confirmation, CostEstimate, LedgerAnchor, LedgerRecord, SubmissionHandle,
    await_outcome, submit_once,
};

// EVM client
pub use crate::{EvmLedger, EvmLedgerConfig};
