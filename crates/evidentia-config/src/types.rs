//! Configuration struct definitions.
//!
//! Every section derives `Default` with the same values as the embedded
//! `defaults.toml`, so a partially-specified file deserializes cleanly.
//! Secrets are omitted from `Serialize` output and redacted in `Debug`.

use std::time::Duration;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Wei per gwei.
const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local mirror and audit storage.
    pub storage: StorageSection,
    /// Field encryption.
    pub cipher: CipherSection,
    /// Ledger connection and anchoring budget.
    pub ledger: LedgerSection,
    /// Audit chain settings.
    pub audit: AuditSection,
    /// Log output.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// StorageSection
// ---------------------------------------------------------------------------

/// Where mirror rows and the audit chain live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// SQLite file path, or `":memory:"`. `None` means `evidentia.db` in
    /// the Evidentia home directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

// ---------------------------------------------------------------------------
// CipherSection
// ---------------------------------------------------------------------------

/// Field cipher key material.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct CipherSection {
    /// 64 hex characters. Prefer `EVIDENTIA_ENCRYPTION_KEY` over storing
    /// this in a file.
    pub key_hex: Option<String>,
}

impl CipherSection {
    /// Whether a key is configured.
    #[must_use]
    pub fn has_key(&self) -> bool {
        self.key_hex.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl std::fmt::Debug for CipherSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherSection")
            .field("has_key", &self.has_key())
            .finish()
    }
}

impl Serialize for CipherSection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CipherSection", 1)?;
        state.serialize_field("has_key", &self.has_key())?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// LedgerSection
// ---------------------------------------------------------------------------

/// Ledger node, contract and signing account.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// JSON-RPC endpoint.
    pub rpc_url: Option<String>,
    /// Evidence contract address (`0x` + 40 hex).
    pub contract_address: Option<String>,
    /// Signing key (`0x` + 64 hex).
    pub private_key: Option<String>,
    /// Chain id. Queried from the node when unset.
    pub chain_id: Option<u64>,
    /// How long to wait for a submission to be included.
    pub confirmation_timeout_secs: u64,
    /// Receipt polling interval.
    pub poll_interval_ms: u64,
    /// Gas limit used when estimation fails.
    pub fallback_gas_limit: u64,
    /// Gas price in gwei used when the node cannot quote one.
    pub fallback_gas_price_gwei: u64,
    /// Accept plain `http://` to hosts other than localhost.
    pub allow_insecure_rpc: bool,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            rpc_url: None,
            contract_address: None,
            private_key: None,
            chain_id: None,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 2000,
            fallback_gas_limit: 2_000_000,
            fallback_gas_price_gwei: 20,
            allow_insecure_rpc: false,
        }
    }
}

impl std::fmt::Debug for LedgerSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerSection")
            .field("rpc_url", &self.rpc_url)
            .field("contract_address", &self.contract_address)
            .field("has_private_key", &self.private_key.is_some())
            .field("chain_id", &self.chain_id)
            .field("confirmation_timeout_secs", &self.confirmation_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("fallback_gas_limit", &self.fallback_gas_limit)
            .field("fallback_gas_price_gwei", &self.fallback_gas_price_gwei)
            .field("allow_insecure_rpc", &self.allow_insecure_rpc)
            .finish()
    }
}

impl Serialize for LedgerSection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LedgerSection", 9)?;
        if let Some(url) = &self.rpc_url {
            state.serialize_field("rpc_url", url)?;
        }
        if let Some(address) = &self.contract_address {
            state.serialize_field("contract_address", address)?;
        }
        state.serialize_field("has_private_key", &self.private_key.is_some())?;
        if let Some(chain_id) = self.chain_id {
            state.serialize_field("chain_id", &chain_id)?;
        }
        state.serialize_field("confirmation_timeout_secs", &self.confirmation_timeout_secs)?;
        state.serialize_field("poll_interval_ms", &self.poll_interval_ms)?;
        state.serialize_field("fallback_gas_limit", &self.fallback_gas_limit)?;
        state.serialize_field("fallback_gas_price_gwei", &self.fallback_gas_price_gwei)?;
        state.serialize_field("allow_insecure_rpc", &self.allow_insecure_rpc)?;
        state.end()
    }
}

/// A ledger section with every required field present.
#[derive(Clone)]
pub struct LedgerSettings {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Evidence contract address.
    pub contract_address: String,
    /// Signing key.
    pub private_key: String,
    /// Chain id, if pinned.
    pub chain_id: Option<u64>,
    /// Confirmation wait.
    pub confirmation_timeout: Duration,
    /// Receipt polling interval.
    pub poll_interval: Duration,
    /// Gas limit used when estimation fails.
    pub fallback_gas_limit: u64,
    /// Gas price in wei used when the node cannot quote one.
    pub fallback_gas_price_wei: u128,
    /// Accept plain `http://` to remote hosts.
    pub allow_insecure_rpc: bool,
}

impl std::fmt::Debug for LedgerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerSettings")
            .field("rpc_url", &self.rpc_url)
            .field("contract_address", &self.contract_address)
            .field("private_key", &"***")
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl LedgerSection {
    /// Demand every field anchoring needs.
    ///
    /// Called when the anchoring or ledger-read path starts, never at load:
    /// capture and retrieval work without a ledger.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming the first absent field.
    pub fn require(&self) -> ConfigResult<LedgerSettings> {
        Ok(LedgerSettings {
            rpc_url: required(self.rpc_url.as_deref(), "ledger.rpc_url", "EVIDENTIA_LEDGER_RPC_URL")?,
            contract_address: required(
                self.contract_address.as_deref(),
                "ledger.contract_address",
                "EVIDENTIA_CONTRACT_ADDRESS",
            )?,
            private_key: required(
                self.private_key.as_deref(),
                "ledger.private_key",
                "EVIDENTIA_PRIVATE_KEY",
            )?,
            chain_id: self.chain_id,
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            fallback_gas_limit: self.fallback_gas_limit,
            fallback_gas_price_wei: u128::from(self.fallback_gas_price_gwei)
                .saturating_mul(WEI_PER_GWEI),
            allow_insecure_rpc: self.allow_insecure_rpc,
        })
    }
}

fn required(value: Option<&str>, field: &str, env: &str) -> ConfigResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_owned()),
        _ => Err(ConfigError::Missing {
            field: field.to_owned(),
            env: env.to_owned(),
        }),
    }
}

// ---------------------------------------------------------------------------
// AuditSection
// ---------------------------------------------------------------------------

/// Audit chain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// Source address recorded on entries this process produces.
    pub source_address: String,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            source_address: "127.0.0.1".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Where logs go: `"stdout"`, `"stderr"`, or `"file"`.
    pub target: String,
    /// Log directory when `target = "file"`. Defaults to `logs/` in the
    /// Evidentia home directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// File rotation: `"daily"`, `"hourly"`, `"minutely"`, or `"never"`.
    pub rotation: String,
    /// Per-crate tracing directives (e.g. `["evidentia_ledger=debug",
    /// "hyper=warn"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            target: "stderr".to_owned(),
            directory: None,
            rotation: "daily".to_owned(),
            directives: Vec::new(),
        }
    }
}
