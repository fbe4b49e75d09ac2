//! Post-merge configuration validation.
//!
//! Checks shapes and ranges only. Presence of ledger credentials is checked
//! later by [`LedgerSection::require`](crate::LedgerSection::require), since
//! capture and retrieval run without them.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_storage(config)?;
    validate_cipher(config)?;
    validate_ledger(config)?;
    validate_audit(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn validate_storage(config: &Config) -> ConfigResult<()> {
    if config.storage.path.as_deref().is_some_and(|p| p.trim().is_empty()) {
        return Err(invalid("storage.path", "path must not be blank"));
    }
    Ok(())
}

fn validate_cipher(config: &Config) -> ConfigResult<()> {
    let Some(key) = config.cipher.key_hex.as_deref() else {
        return Ok(());
    };
    if key.is_empty() {
        return Ok(());
    }
    if key.len() != 64 || !is_hex(key) {
        return Err(invalid(
            "cipher.key_hex",
            format!(
                "key must be 64 hex characters (32 bytes), got {} characters",
                key.len()
            ),
        ));
    }
    Ok(())
}

fn validate_ledger(config: &Config) -> ConfigResult<()> {
    let l = &config.ledger;

    if let Some(url) = l.rpc_url.as_deref() {
        let lower = url.to_ascii_lowercase();
        if !lower.starts_with("https://") && !lower.starts_with("http://") {
            return Err(invalid(
                "ledger.rpc_url",
                format!("unsupported scheme in '{url}'; expected https:// or http://"),
            ));
        }
    }

    if let Some(address) = l.contract_address.as_deref() {
        let hex = strip_0x(address);
        if hex.len() != 40 || !is_hex(hex) {
            return Err(invalid(
                "ledger.contract_address",
                "address must be 0x followed by 40 hex characters",
            ));
        }
    }

    if let Some(key) = l.private_key.as_deref() {
        let hex = strip_0x(key);
        if hex.len() != 64 || !is_hex(hex) {
            return Err(invalid(
                "ledger.private_key",
                "private key must be 64 hex characters",
            ));
        }
    }

    if l.chain_id == Some(0) {
        return Err(invalid("ledger.chain_id", "chain id must be positive"));
    }
    if l.confirmation_timeout_secs == 0 {
        return Err(invalid(
            "ledger.confirmation_timeout_secs",
            "confirmation timeout must be at least one second",
        ));
    }
    if l.poll_interval_ms == 0 {
        return Err(invalid(
            "ledger.poll_interval_ms",
            "poll interval must be positive",
        ));
    }
    if l.poll_interval_ms > l.confirmation_timeout_secs.saturating_mul(1000) {
        return Err(invalid(
            "ledger.poll_interval_ms",
            "poll interval must not exceed the confirmation timeout",
        ));
    }
    if l.fallback_gas_limit == 0 {
        return Err(invalid(
            "ledger.fallback_gas_limit",
            "fallback gas limit must be positive",
        ));
    }
    if l.fallback_gas_price_gwei == 0 {
        return Err(invalid(
            "ledger.fallback_gas_price_gwei",
            "fallback gas price must be positive",
        ));
    }
    Ok(())
}

fn validate_audit(config: &Config) -> ConfigResult<()> {
    if config.audit.source_address.trim().is_empty() {
        return Err(invalid(
            "audit.source_address",
            "source address must not be blank",
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let lg = &config.logging;

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&lg.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                lg.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&lg.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                lg.format,
                valid_formats.join(", ")
            ),
        ));
    }

    let valid_targets = ["stdout", "stderr", "file"];
    if !valid_targets.contains(&lg.target.as_str()) {
        return Err(invalid(
            "logging.target",
            format!(
                "unsupported log target '{}'; expected one of: {}",
                lg.target,
                valid_targets.join(", ")
            ),
        ));
    }

    let valid_rotations = ["daily", "hourly", "minutely", "never"];
    if !valid_rotations.contains(&lg.rotation.as_str()) {
        return Err(invalid(
            "logging.rotation",
            format!(
                "unsupported rotation '{}'; expected one of: {}",
                lg.rotation,
                valid_rotations.join(", ")
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_short_cipher_key_rejected() {
        let mut config = Config::default();
        config.cipher.key_hex = Some("abcd".into());
        assert_eq!(field_of(validate(&config)), "cipher.key_hex");
    }

    #[test]
    fn test_non_hex_cipher_key_rejected() {
        let mut config = Config::default();
        config.cipher.key_hex = Some("zz".repeat(32));
        assert_eq!(field_of(validate(&config)), "cipher.key_hex");
    }

    #[test]
    fn test_valid_cipher_key_accepted() {
        let mut config = Config::default();
        config.cipher.key_hex = Some("0f".repeat(32));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_bad_contract_address_rejected() {
        let mut config = Config::default();
        config.ledger.contract_address = Some("0x1234".into());
        assert_eq!(field_of(validate(&config)), "ledger.contract_address");
    }

    #[test]
    fn test_ws_scheme_rejected() {
        let mut config = Config::default();
        config.ledger.rpc_url = Some("ws://localhost:8546".into());
        assert_eq!(field_of(validate(&config)), "ledger.rpc_url");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.ledger.confirmation_timeout_secs = 0;
        assert_eq!(field_of(validate(&config)), "ledger.confirmation_timeout_secs");
    }

    #[test]
    fn test_poll_slower_than_timeout_rejected() {
        let mut config = Config::default();
        config.ledger.confirmation_timeout_secs = 1;
        config.ledger.poll_interval_ms = 5000;
        assert_eq!(field_of(validate(&config)), "ledger.poll_interval_ms");
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let mut config = Config::default();
        config.logging.format = "xml".into();
        assert_eq!(field_of(validate(&config)), "logging.format");
    }

    #[test]
    fn test_unknown_rotation_rejected() {
        let mut config = Config::default();
        config.logging.rotation = "weekly".into();
        assert_eq!(field_of(validate(&config)), "logging.rotation");
    }
}
