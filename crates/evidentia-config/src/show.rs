//! Source-annotated display for `config show`.

use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

use crate::merge::FieldSources;
use crate::types::Config;

/// Database file used when `storage.path` is unset.
const DEFAULT_DB_FILE: &str = "evidentia.db";

/// A resolved configuration together with source annotations.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final merged configuration.
    pub config: Config,
    /// Dotted field path → which layer set the value.
    pub field_sources: FieldSources,
    /// Config file paths that were loaded (in precedence order).
    pub loaded_files: Vec<String>,
    /// The Evidentia home directory (`~/.evidentia` unless overridden).
    pub home: PathBuf,
}

/// Output format for `config show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowFormat {
    /// TOML with inline comments showing source.
    Toml,
    /// JSON (for programmatic consumption).
    Json,
}

impl ResolvedConfig {
    /// The SQLite path to open: `storage.path` if set, else
    /// `evidentia.db` under [`home`](Self::home).
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.config
            .storage
            .path
            .as_deref()
            .map_or_else(|| self.home.join(DEFAULT_DB_FILE), PathBuf::from)
    }

    /// Directory for file logs: `logging.directory` if set, else `logs/`
    /// under [`home`](Self::home).
    #[must_use]
    pub fn log_directory(&self) -> PathBuf {
        self.config
            .logging
            .directory
            .as_deref()
            .map_or_else(|| self.home.join("logs"), PathBuf::from)
    }

    /// Whether `path` is the in-memory database marker.
    #[must_use]
    pub fn is_in_memory(path: &Path) -> bool {
        path.as_os_str() == ":memory:"
    }

    /// Format the resolved config. Secrets are never printed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or `section` does not exist.
    pub fn show(&self, format: ShowFormat, section: Option<&str>) -> Result<String, fmt::Error> {
        match format {
            ShowFormat::Toml => self.show_toml(section),
            ShowFormat::Json => self.show_json(section),
        }
    }

    fn section_value(&self, section: &str) -> Result<toml::Value, fmt::Error> {
        let val = toml::Value::try_from(&self.config).map_err(|_| fmt::Error)?;
        val.as_table()
            .and_then(|t| t.get(section))
            .cloned()
            .ok_or(fmt::Error)
    }

    fn show_toml(&self, section: Option<&str>) -> Result<String, fmt::Error> {
        let toml_str = match section {
            Some(name) => {
                toml::to_string_pretty(&self.section_value(name)?).map_err(|_| fmt::Error)?
            },
            None => toml::to_string_pretty(&self.config).map_err(|_| fmt::Error)?,
        };

        let mut output = String::new();
        output.push_str("# Resolved Evidentia configuration\n");
        output.push_str("# Source annotations: [defaults] [user] [--config] [env]\n");
        if !self.loaded_files.is_empty() {
            output.push_str("#\n# Loaded files (in precedence order):\n");
            for (i, path) in self.loaded_files.iter().enumerate() {
                writeln!(output, "#   {}. {path}", i.saturating_add(1))?;
            }
        }
        output.push('\n');

        let mut current = section.unwrap_or("").to_owned();
        for line in toml_str.lines() {
            let trimmed = line.trim();
            if let Some(header) = trimmed.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
                current = header.to_owned();
            }
            match self.annotate_line(trimmed, &current) {
                Some(annotation) => writeln!(output, "{line}  # {annotation}")?,
                None => writeln!(output, "{line}")?,
            }
        }
        Ok(output)
    }

    fn show_json(&self, section: Option<&str>) -> Result<String, fmt::Error> {
        match section {
            Some(name) => {
                serde_json::to_string_pretty(&self.section_value(name)?).map_err(|_| fmt::Error)
            },
            None => serde_json::to_string_pretty(&self.config).map_err(|_| fmt::Error),
        }
    }

    /// Source annotation for a `key = value` line under `table`.
    fn annotate_line(&self, trimmed: &str, table: &str) -> Option<String> {
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
            return None;
        }
        let key = trimmed.split('=').next()?.trim();
        let path = if table.is_empty() {
            key.to_owned()
        } else {
            format!("{table}.{key}")
        };
        self.field_sources
            .get(&path)
            .map(|layer| format!("[{layer}]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::ConfigLayer;

    fn resolved() -> ResolvedConfig {
        ResolvedConfig {
            config: Config::default(),
            field_sources: FieldSources::new(),
            loaded_files: Vec::new(),
            home: PathBuf::from("/home/investigator/.evidentia"),
        }
    }

    #[test]
    fn test_show_toml_annotates_sources() {
        let mut r = resolved();
        r.field_sources
            .insert("logging.level".into(), ConfigLayer::Environment);

        let output = r.show(ShowFormat::Toml, None).unwrap();
        assert!(output.contains("Resolved Evidentia configuration"));
        assert!(output.contains("level = \"info\"  # [env]"));
    }

    #[test]
    fn test_show_json_is_valid_and_hides_keys() {
        let mut r = resolved();
        r.config.cipher.key_hex = Some("ab".repeat(32));
        let output = r.show(ShowFormat::Json, None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["cipher"]["has_key"], true);
        assert!(!output.contains(&"ab".repeat(32)));
    }

    #[test]
    fn test_show_section() {
        let output = resolved().show(ShowFormat::Toml, Some("ledger")).unwrap();
        assert!(output.contains("confirmation_timeout_secs"));
        assert!(!output.contains("source_address"));
        assert!(resolved().show(ShowFormat::Toml, Some("nope")).is_err());
    }

    #[test]
    fn test_database_path_defaults_under_home() {
        let mut r = resolved();
        assert_eq!(
            r.database_path(),
            PathBuf::from("/home/investigator/.evidentia/evidentia.db")
        );
        r.config.storage.path = Some(":memory:".into());
        assert!(ResolvedConfig::is_in_memory(&r.database_path()));
    }
}
