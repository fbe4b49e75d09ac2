//! Failures while locating, merging, or checking Evidentia settings.

use std::io;

use thiserror::Error;

/// Anything that stops a [`ResolvedConfig`](crate::ResolvedConfig) from
/// being produced or used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A layer file exists (or was named with `--config`) but is unreadable.
    #[error("cannot read {path}: {source}")]
    ReadError {
        /// File that was being read.
        path: String,
        /// I/O cause.
        #[source]
        source: io::Error,
    },

    /// A layer file is not valid TOML, or the merged tree does not fit the
    /// settings schema.
    #[error("{path} is not a valid Evidentia config: {source}")]
    ParseError {
        /// File, or a `<...>` label for embedded or merged trees.
        path: String,
        /// TOML cause.
        #[source]
        source: toml::de::Error,
    },

    /// A value parsed but is out of range or malformed.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted path such as `cipher.key_hex`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The command needs a setting that no layer provided.
    #[error("{field} is not configured; add it to config.toml or export {env}")]
    Missing {
        /// Dotted path of the absent setting.
        field: String,
        /// Environment fallback for it.
        env: String,
    },

    /// `$HOME` could not be resolved, so `~/.evidentia` has no location.
    #[error("no home directory; pass --config explicitly")]
    NoHomeDir,
}

/// Shorthand used across the config crate.
pub type ConfigResult<T> = Result<T, ConfigError>;
