//! Prelude module - commonly used test utilities.
//!
//! Use `use evidentia_test::prelude::*;` in test modules.

pub use crate::{
    INVESTIGATOR, MockClassifier, MockFetcher, MockLedger, NextSubmission, OTHER_INVESTIGATOR,
    REFERENCE_AUTHOR, REFERENCE_CONTENT, REFERENCE_POST_ID, REFERENCE_TIMESTAMP, TestHarness,
    sample_classification, sample_fetched, sample_input, sample_input_for, setup_test_logging,
};
