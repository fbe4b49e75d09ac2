//! Evidentia Ledger - Anchoring evidence fingerprints on an external ledger.
//!
//! This crate provides:
//! - [`LedgerAnchor`]: the capability set a ledger must offer
//! - [`submit_once`] / [`await_outcome`]: send exactly once, then wait
//! - [`EvmLedger`]: a JSON-RPC client for the evidence contract
//!
//! # Submission semantics
//!
//! Ledger writes are not idempotent. Nothing here retries a submission;
//! a [`Confirmation::Timeout`] means the write may still land and must be
//! re-queried by its handle, while [`Confirmation::Reverted`] is final.
//!
//! Confidence travels as a fixed-point integer
//! ([`evidentia_core::CONFIDENCE_SCALE`]) because the contract has no
//! float type.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod abi;
mod anchor;
mod error;
mod evm;
pub mod rlp;
pub mod rpc;
pub mod tx;

pub use anchor::{
    AnchoredRecord, Confirmation, CostEstimate, DEFAULT_CONFIRMATION_TIMEOUT, LedgerAnchor,
    LedgerRecord, SubmissionHandle, UNCLASSIFIED, await_outcome, submit_once,
};
pub use error::{LedgerError, LedgerResult};
pub use evm::{
    DEFAULT_FALLBACK_GAS_LIMIT, DEFAULT_FALLBACK_GAS_PRICE_WEI, DEFAULT_POLL_INTERVAL, EvmLedger,
    EvmLedgerConfig, stored_receipt_json,
};
pub use rpc::validate_rpc_url;
