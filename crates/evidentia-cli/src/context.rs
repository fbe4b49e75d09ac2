//! Startup wiring: one place where configuration becomes live components.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use evidentia_audit::AuditChain;
use evidentia_config::{LedgerSettings, ResolvedConfig};
use evidentia_crypto::AesFieldCipher;
use evidentia_evidence::EvidenceStore;
use evidentia_ledger::{EvmLedger, EvmLedgerConfig};
use evidentia_storage::{KvStore, SqliteKvStore};
use evidentia_telemetry::{FileRotation, LogConfig, LogFormat, LogTarget};
use tracing::debug;

/// Map the `[logging]` section onto a telemetry config.
///
/// Values were validated at load; anything unparseable falls back to the
/// telemetry default.
pub(crate) fn to_log_config(resolved: &ResolvedConfig) -> LogConfig {
    let section = &resolved.config.logging;
    let mut config = LogConfig::new(section.level.clone())
        .with_format(section.format.parse().unwrap_or(LogFormat::Compact));

    let rotation: FileRotation = section.rotation.parse().unwrap_or_default();
    config = match section.target.as_str() {
        "stdout" => config.with_target(LogTarget::Stdout),
        "file" => config.with_file_logging(resolved.log_directory(), rotation),
        _ => config.with_target(LogTarget::Stderr),
    };

    for directive in &section.directives {
        config = config.with_directive(directive.clone());
    }
    config
}

/// Turn complete ledger settings into the EVM client's config.
pub(crate) fn ledger_config(settings: LedgerSettings) -> EvmLedgerConfig {
    let mut config = EvmLedgerConfig::new(
        settings.rpc_url,
        settings.contract_address,
        settings.private_key,
    );
    config.chain_id = settings.chain_id;
    config.allow_insecure_rpc = settings.allow_insecure_rpc;
    config.confirmation_timeout = settings.confirmation_timeout;
    config.poll_interval = settings.poll_interval;
    config.fallback_gas_limit = settings.fallback_gas_limit;
    config.fallback_gas_price_wei = settings.fallback_gas_price_wei;
    config
}

/// Build the ledger client. Fails hard when any credential is missing.
pub(crate) fn connect_ledger(resolved: &ResolvedConfig) -> Result<Arc<EvmLedger>> {
    let settings = resolved
        .config
        .ledger
        .require()
        .context("the ledger is not configured")?;
    let ledger = EvmLedger::new(ledger_config(settings)).context("invalid ledger settings")?;
    Ok(Arc::new(ledger))
}

/// Components shared by the evidence and audit commands.
pub(crate) struct App {
    pub(crate) resolved: ResolvedConfig,
    pub(crate) store: EvidenceStore,
}

impl App {
    /// Open the database, the cipher and the audit chain. No ledger.
    pub(crate) fn open(resolved: ResolvedConfig) -> Result<Self> {
        let kv = open_store(&resolved.database_path())?;
        let cipher = AesFieldCipher::from_hex_key(resolved.config.cipher.key_hex.as_deref());
        let audit = AuditChain::with_store(
            Arc::clone(&kv),
            resolved.config.audit.source_address.clone(),
        );
        let store = EvidenceStore::new(kv, Arc::new(cipher), Arc::new(audit));
        Ok(Self { resolved, store })
    }

    /// Attach the ledger client for the anchoring and verification paths.
    pub(crate) fn with_ledger(mut self) -> Result<Self> {
        let ledger = connect_ledger(&self.resolved)?;
        self.store = self.store.with_ledger(ledger);
        Ok(self)
    }
}

fn open_store(path: &Path) -> Result<Arc<dyn KvStore>> {
    if ResolvedConfig::is_in_memory(path) {
        debug!("using in-memory database");
        return Ok(Arc::new(SqliteKvStore::open_in_memory()?));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let store = SqliteKvStore::open(path)
        .with_context(|| format!("cannot open database {}", path.display()))?;
    debug!(path = %path.display(), "opened database");
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use evidentia_config::Config;

    fn resolved(home: &std::path::Path) -> ResolvedConfig {
        ResolvedConfig {
            config: Config::default(),
            field_sources: evidentia_config::merge::FieldSources::new(),
            loaded_files: Vec::new(),
            home: home.to_path_buf(),
        }
    }

    #[test]
    fn test_log_config_from_file_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = resolved(dir.path());
        r.config.logging.target = "file".into();
        r.config.logging.format = "json".into();
        r.config.logging.rotation = "hourly".into();
        r.config.logging.directives = vec!["evidentia_ledger=debug".into()];

        let config = to_log_config(&r);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.rotation, FileRotation::Hourly);
        assert_eq!(config.target, LogTarget::File(dir.path().join("logs")));
        assert_eq!(config.directives, vec!["evidentia_ledger=debug"]);
    }

    #[test]
    fn test_ledger_config_carries_timing() {
        let settings = LedgerSettings {
            rpc_url: "https://rpc.example".into(),
            contract_address: format!("0x{}", "11".repeat(20)),
            private_key: "46".repeat(32),
            chain_id: Some(137),
            confirmation_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            fallback_gas_limit: 900_000,
            fallback_gas_price_wei: 5,
            allow_insecure_rpc: true,
        };
        let config = ledger_config(settings);
        assert_eq!(config.chain_id, Some(137));
        assert_eq!(config.confirmation_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.fallback_gas_limit, 900_000);
        assert!(config.allow_insecure_rpc);
    }

    #[test]
    fn test_connect_ledger_requires_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let err = connect_ledger(&resolved(dir.path())).unwrap_err();
        assert!(format!("{err:#}").contains("EVIDENTIA_LEDGER_RPC_URL"));
    }

    #[tokio::test]
    async fn test_open_creates_database_under_home() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("nested");
        let app = App::open(resolved(&home)).unwrap();
        assert!(app.store.audit().is_empty().await.unwrap());
        assert!(home.join("evidentia.db").exists());
    }
}
