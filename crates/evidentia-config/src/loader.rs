//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `<home>/config.toml` (user), where home is `~/.evidentia` or
//!    a validated `EVIDENTIA_HOME`
//! 3. Merge the file given with `--config`, which must exist
//! 4. Apply env var fallbacks for fields no file set
//! 5. Deserialize merged tree → `Config`
//! 6. Validate
//! 7. Return `ResolvedConfig`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::show::ResolvedConfig;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Directory under the user's home holding config, database and logs.
pub const HOME_DIR_NAME: &str = ".evidentia";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Load the configuration with layered precedence.
///
/// `explicit` is a file passed on the command line; unlike the user file it
/// must exist. `home_override` replaces the Evidentia home directory
/// (normally `~/.evidentia`).
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, the explicit
/// file cannot be read, or the merged configuration fails validation.
pub fn load(explicit: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    load_with_env(explicit, home_override, &collect_env_vars())
}

/// [`load`] with an explicit environment, for tests and embedding.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env(
    explicit: Option<&Path>,
    home_override: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<ResolvedConfig> {
    let home = match home_override {
        Some(h) => h.to_path_buf(),
        None => evidentia_home(env_vars)?,
    };

    // 1. Embedded defaults.
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    // 2. User config.
    let user_path = home.join("config.toml");
    if let Some(overlay) = try_load_file(&user_path)? {
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::User,
            &mut field_sources,
        );
        loaded_files.push(user_path.display().to_string());
        info!(path = %user_path.display(), "loaded user config");
    }

    // 3. Explicit --config file.
    if let Some(path) = explicit {
        let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        })?;
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::Explicit,
            &mut field_sources,
        );
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded config file");
    }

    // 4. Env var fallbacks.
    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    // 5. Deserialize.
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    // 6. Validate.
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
        home,
    })
}

/// Try to load a file, returning `None` if the file doesn't exist.
///
/// Reads once, then checks the size, so there is no stat/read race.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(value))
}

/// `EVIDENTIA_HOME` if it names a directory owned by the current user,
/// else `~/.evidentia`.
fn evidentia_home(env_vars: &HashMap<String, String>) -> ConfigResult<PathBuf> {
    let user_home = directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)?;

    if let Some(raw) = env_vars.get("EVIDENTIA_HOME") {
        if let Some(dir) = validate_home_override(raw, &user_home) {
            return Ok(dir);
        }
        warn!(
            path = raw,
            "EVIDENTIA_HOME is not a directory owned by the current user; ignoring"
        );
    }
    Ok(user_home.join(HOME_DIR_NAME))
}

/// Canonicalize `raw` and check it is a directory with the same owner as
/// `user_home`.
fn validate_home_override(raw: &str, user_home: &Path) -> Option<PathBuf> {
    let canonical = PathBuf::from(raw).canonicalize().ok()?;
    if !canonical.is_dir() {
        return None;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let dir_uid = canonical.metadata().ok()?.uid();
        let home_uid = user_home.metadata().ok()?.uid();
        if dir_uid != home_uid {
            return None;
        }
    }

    #[cfg(not(unix))]
    let _ = user_home;

    Some(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_defaults_deserialize_to_default_config() {
        let parsed: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        let default = Config::default();
        assert_eq!(parsed.ledger.confirmation_timeout_secs, default.ledger.confirmation_timeout_secs);
        assert_eq!(parsed.ledger.poll_interval_ms, default.ledger.poll_interval_ms);
        assert_eq!(parsed.ledger.fallback_gas_limit, default.ledger.fallback_gas_limit);
        assert_eq!(parsed.audit.source_address, default.audit.source_address);
        assert_eq!(parsed.logging.format, default.logging.format);
        assert!(!parsed.cipher.has_key());
    }

    #[test]
    fn test_load_with_empty_home() {
        let home = tempfile::tempdir().unwrap();
        let resolved = load_with_env(None, Some(home.path()), &env(&[])).unwrap();
        assert!(resolved.loaded_files.is_empty());
        assert_eq!(resolved.database_path(), home.path().join("evidentia.db"));
        assert_eq!(
            resolved.field_sources.get("logging.level"),
            Some(&ConfigLayer::Defaults)
        );
    }

    #[test]
    fn test_precedence_explicit_over_user_over_env() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(
            home.path().join("config.toml"),
            "[logging]\nlevel = \"warn\"\n[ledger]\npoll_interval_ms = 500\n",
        )
        .unwrap();
        let explicit = home.path().join("override.toml");
        std::fs::write(&explicit, "[logging]\nlevel = \"debug\"\n").unwrap();

        let resolved = load_with_env(
            Some(&explicit),
            Some(home.path()),
            &env(&[
                ("EVIDENTIA_LOG_LEVEL", "error"),
                ("EVIDENTIA_LEDGER_RPC_URL", "https://rpc.example"),
            ]),
        )
        .unwrap();

        let c = &resolved.config;
        assert_eq!(c.logging.level, "debug");
        assert_eq!(c.ledger.poll_interval_ms, 500);
        assert_eq!(c.ledger.rpc_url.as_deref(), Some("https://rpc.example"));
        assert_eq!(resolved.loaded_files.len(), 2);
        assert_eq!(
            resolved.field_sources.get("ledger.rpc_url"),
            Some(&ConfigLayer::Environment)
        );
        assert_eq!(
            resolved.field_sources.get("logging.level"),
            Some(&ConfigLayer::Explicit)
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let home = tempfile::tempdir().unwrap();
        let result = load_with_env(
            Some(Path::new("/nonexistent/evidentia.toml")),
            Some(home.path()),
            &env(&[]),
        );
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_malformed_key_from_env_fails_validation() {
        let home = tempfile::tempdir().unwrap();
        let result = load_with_env(
            None,
            Some(home.path()),
            &env(&[("ENCRYPTION_KEY", "not-a-key")]),
        );
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError { ref field, .. }) if field == "cipher.key_hex"
        ));
    }

    #[test]
    fn test_oversized_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("huge.toml");
        let data = "x = \"".to_owned() + &"a".repeat(1_100_000) + "\"";
        std::fs::write(&file_path, data).unwrap();

        assert!(matches!(
            try_load_file(&file_path),
            Err(ConfigError::ValidationError { .. })
        ));
    }
}
