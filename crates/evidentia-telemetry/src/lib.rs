//! Evidentia Telemetry - Logging setup.
//!
//! One call installs a `tracing` subscriber with an `EnvFilter` built from a
//! level plus per-crate directives, and a single formatting layer writing to
//! stdout, stderr, or rolling files.
//!
//! # Example
//!
//! ```rust,no_run
//! use evidentia_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), evidentia_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("evidentia_ledger=debug");
//! setup_logging(&config)?;
//! tracing::info!("ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileRotation, LogConfig, LogFormat, LogTarget, setup_logging,
};
