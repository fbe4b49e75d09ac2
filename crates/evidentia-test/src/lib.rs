//! Evidentia Test - Shared test utilities for Evidentia.
//!
//! Mocks, fixtures and a harness for use as a dev-dependency.
//!
//! ```rust,ignore
//! use evidentia_test::{INVESTIGATOR, TestHarness, sample_input};
//!
//! #[tokio::test]
//! async fn test_anchor() {
//!     let h = TestHarness::new();
//!     let id = h.store.create(sample_input(), INVESTIGATOR, None).await.unwrap();
//!     h.store.anchor(id, INVESTIGATOR).await.unwrap();
//!     assert_eq!(h.ledger.len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
