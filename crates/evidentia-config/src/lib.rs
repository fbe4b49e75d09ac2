//! Settings for the Evidentia CLI.
//!
//! [`Config`] has one section per subsystem: `storage`, `cipher`, `ledger`,
//! `audit` and `logging`. [`Config::load`] resolves it from up to four
//! layers, each overriding the one below:
//!
//! | layer | source |
//! |-------|--------|
//! | `--config` | file named on the command line |
//! | user | `$EVIDENTIA_HOME/config.toml`, else `~/.evidentia/config.toml` |
//! | env | `EVIDENTIA_*` plus `ENCRYPTION_KEY`, `CONTRACT_ADDRESS`, `PRIVATE_KEY`; only for fields no file set |
//! | defaults | `defaults.toml`, embedded at build time |
//!
//! ```rust,no_run
//! use evidentia_config::Config;
//!
//! let resolved = Config::load(None)?;
//! println!("database: {}", resolved.database_path().display());
//! # Ok::<(), evidentia_config::ConfigError>(())
//! ```
//!
//! Nothing here depends on the other Evidentia crates; the CLI turns
//! [`LedgerSettings`] into a ledger client itself.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// `EVIDENTIA_*` and legacy variable fallbacks.
pub mod env;
/// [`ConfigError`].
pub mod error;
/// Layer discovery and the resolve pipeline.
pub mod loader;
/// TOML tree merging with per-field provenance.
pub mod merge;
/// [`ResolvedConfig`] and its rendering for `config show`.
pub mod show;
/// Section structs.
pub mod types;
/// Range and format checks run after merging.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::HOME_DIR_NAME;
pub use merge::ConfigLayer;
pub use show::{ResolvedConfig, ShowFormat};
pub use types::*;

impl Config {
    /// Resolve settings from every layer, with `explicit` as the `--config`
    /// file if given.
    ///
    /// # Errors
    ///
    /// An unreadable or malformed layer file, a missing `explicit` file, or
    /// a merged value that fails validation.
    pub fn load(explicit: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(explicit, None)
    }
}
