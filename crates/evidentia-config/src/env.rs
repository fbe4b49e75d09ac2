//! Environment variable fallbacks.
//!
//! Env vars are **fallback**, not override: they only fill fields that no
//! config file set.

use std::collections::HashMap;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

/// Supported `EVIDENTIA_*` variables, then the unprefixed names older
/// deployments used. The first variable present for a field wins.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "EVIDENTIA_STORAGE_PATH",
        field_path: "storage.path",
    },
    EnvMapping {
        var_name: "EVIDENTIA_ENCRYPTION_KEY",
        field_path: "cipher.key_hex",
    },
    EnvMapping {
        var_name: "EVIDENTIA_LEDGER_RPC_URL",
        field_path: "ledger.rpc_url",
    },
    EnvMapping {
        var_name: "EVIDENTIA_CONTRACT_ADDRESS",
        field_path: "ledger.contract_address",
    },
    EnvMapping {
        var_name: "EVIDENTIA_PRIVATE_KEY",
        field_path: "ledger.private_key",
    },
    EnvMapping {
        var_name: "EVIDENTIA_CHAIN_ID",
        field_path: "ledger.chain_id",
    },
    EnvMapping {
        var_name: "EVIDENTIA_ALLOW_INSECURE_RPC",
        field_path: "ledger.allow_insecure_rpc",
    },
    EnvMapping {
        var_name: "EVIDENTIA_AUDIT_SOURCE_ADDRESS",
        field_path: "audit.source_address",
    },
    EnvMapping {
        var_name: "EVIDENTIA_LOG_LEVEL",
        field_path: "logging.level",
    },
    EnvMapping {
        var_name: "EVIDENTIA_LOG_FORMAT",
        field_path: "logging.format",
    },
    // Legacy names.
    EnvMapping {
        var_name: "ENCRYPTION_KEY",
        field_path: "cipher.key_hex",
    },
    EnvMapping {
        var_name: "CONTRACT_ADDRESS",
        field_path: "ledger.contract_address",
    },
    EnvMapping {
        var_name: "PRIVATE_KEY",
        field_path: "ledger.private_key",
    },
];

/// Apply environment variable fallbacks to fields that were **not** set by
/// any config file layer.
///
/// Returns the number of env vars applied.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults)
        {
            continue;
        }

        let Some(val) = env_vars.get(mapping.var_name) else {
            continue;
        };
        if val.is_empty() {
            continue;
        }

        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var fallback"
        );
        set_field_from_string(merged, mapping.field_path, val);
        sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
        count = count.saturating_add(1);
    }

    count
}

/// Set a dotted field in the TOML tree, creating intermediate tables.
fn set_field_from_string(root: &mut toml::Value, path: &str, val: &str) {
    let toml_val = coerce_to_toml_value(path, val);

    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current = root;
    for segment in segments {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), toml_val);
    }
}

/// Coerce a string env var value to the TOML type the field expects.
/// Values that do not parse are kept as strings so validation reports them.
fn coerce_to_toml_value(path: &str, val: &str) -> toml::Value {
    if matches!(
        path,
        "ledger.chain_id"
            | "ledger.confirmation_timeout_secs"
            | "ledger.poll_interval_ms"
            | "ledger.fallback_gas_limit"
            | "ledger.fallback_gas_price_gwei"
    ) {
        if let Ok(i) = val.parse::<i64>() {
            return toml::Value::Integer(i);
        }
    }

    if path == "ledger.allow_insecure_rpc" {
        if let Ok(b) = val.parse::<bool>() {
            return toml::Value::Boolean(b);
        }
    }

    toml::Value::String(val.to_owned())
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_apply_env_fallbacks() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"info\"").unwrap();
        let mut sources = FieldSources::new();
        let env = make_env(&[("EVIDENTIA_LEDGER_RPC_URL", "https://rpc.example")]);

        let count = apply_env_fallbacks(&mut merged, &mut sources, &env);

        assert_eq!(count, 1);
        assert_eq!(merged["ledger"]["rpc_url"].as_str(), Some("https://rpc.example"));
        assert_eq!(sources.get("ledger.rpc_url"), Some(&ConfigLayer::Environment));
    }

    #[test]
    fn test_env_fallback_skips_fields_set_by_files() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"warn\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::User);

        let env = make_env(&[("EVIDENTIA_LOG_LEVEL", "debug")]);
        assert_eq!(apply_env_fallbacks(&mut merged, &mut sources, &env), 0);
        assert_eq!(merged["logging"]["level"].as_str(), Some("warn"));
    }

    #[test]
    fn test_env_fallback_overrides_defaults() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"info\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::Defaults);

        let env = make_env(&[("EVIDENTIA_LOG_LEVEL", "debug")]);
        assert_eq!(apply_env_fallbacks(&mut merged, &mut sources, &env), 1);
        assert_eq!(merged["logging"]["level"].as_str(), Some("debug"));
    }

    #[test]
    fn test_prefixed_name_wins_over_legacy() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut sources = FieldSources::new();
        let env = make_env(&[
            ("ENCRYPTION_KEY", "legacy"),
            ("EVIDENTIA_ENCRYPTION_KEY", "current"),
        ]);

        apply_env_fallbacks(&mut merged, &mut sources, &env);
        assert_eq!(merged["cipher"]["key_hex"].as_str(), Some("current"));
    }

    #[test]
    fn test_legacy_name_is_honoured() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut sources = FieldSources::new();
        let env = make_env(&[("PRIVATE_KEY", "0xabc")]);

        apply_env_fallbacks(&mut merged, &mut sources, &env);
        assert_eq!(merged["ledger"]["private_key"].as_str(), Some("0xabc"));
    }

    #[test]
    fn test_coercion() {
        assert_eq!(
            coerce_to_toml_value("ledger.chain_id", "11155111").as_integer(),
            Some(11_155_111)
        );
        assert_eq!(
            coerce_to_toml_value("ledger.allow_insecure_rpc", "true").as_bool(),
            Some(true)
        );
        assert_eq!(
            coerce_to_toml_value("ledger.chain_id", "sepolia").as_str(),
            Some("sepolia")
        );
    }
}
