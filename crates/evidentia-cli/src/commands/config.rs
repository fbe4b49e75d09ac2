//! CLI handlers for the `evidentia config` subcommand.

use std::process::ExitCode;

use anyhow::Result;
use evidentia_config::{ConfigResult, ResolvedConfig, ShowFormat};

use crate::theme::Theme;

/// Show the resolved configuration with source annotations.
pub(crate) fn show(resolved: &ResolvedConfig, json: bool, section: Option<&str>) -> Result<ExitCode> {
    let format = if json { ShowFormat::Json } else { ShowFormat::Toml };
    let output = resolved
        .show(format, section)
        .map_err(|_| match section {
            Some(name) => anyhow::anyhow!("unknown config section '{name}'"),
            None => anyhow::anyhow!("failed to format config"),
        })?;
    println!("{output}");
    Ok(ExitCode::SUCCESS)
}

/// Report whether the configuration loads, and whether the ledger section
/// is complete enough to anchor.
pub(crate) fn validate(loaded: &ConfigResult<ResolvedConfig>) -> ExitCode {
    let resolved = match loaded {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("{}", Theme::error(&format!("Configuration error: {e}")));
            return ExitCode::FAILURE;
        },
    };

    println!("{}", Theme::success("Configuration is valid."));
    if !resolved.loaded_files.is_empty() {
        println!("\nLoaded files:");
        for path in &resolved.loaded_files {
            println!("  - {path}");
        }
    }
    println!("{}", Theme::kv("Database", &resolved.database_path().display().to_string()));

    if !resolved.config.cipher.has_key() {
        println!(
            "{}",
            Theme::warning("No encryption key: mirror fields will be stored in plaintext")
        );
    }
    if let Err(e) = resolved.config.ledger.require() {
        println!("{}", Theme::warning(&format!("Anchoring unavailable: {e}")));
    }
    ExitCode::SUCCESS
}
