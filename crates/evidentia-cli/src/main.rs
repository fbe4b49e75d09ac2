//! Evidentia CLI - evidence integrity core.
//!
//! Captures posts into the encrypted local mirror, anchors their canonical
//! hash on the ledger, and reconciles local records against the ledger copy.
//! Every command runs against the database and ledger named in the layered
//! configuration (`evidentia config show`).

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use evidentia_config::Config;
use evidentia_core::{ActorId, RecordId};

mod commands;
mod context;
mod theme;

use commands::{audit, config, evidence, keygen, ledger};
use context::App;

/// Evidentia - tamper-evident evidence capture
#[derive(Parser)]
#[command(name = "evidentia")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file layered over ~/.evidentia/config.toml
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Authenticated investigator id performing the operation
    #[arg(short, long, global = true, env = "EVIDENTIA_ACTOR")]
    actor: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// How command results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable, coloured.
    Pretty,
    /// JSON on stdout.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a field encryption key
    Keygen,

    /// Capture a post from a JSON payload (file or stdin)
    Capture {
        /// Payload file; `-` or omitted reads stdin
        input: Option<PathBuf>,
        /// Classification category
        #[arg(long, requires = "confidence")]
        classification: Option<String>,
        /// Classification confidence in [0, 1]
        #[arg(long, requires = "classification")]
        confidence: Option<f64>,
        /// Text the investigator claims the post contained
        #[arg(long)]
        submitted_text: Option<String>,
    },

    /// Anchor a record's hash on the ledger
    Anchor {
        /// Record id
        id: u64,
    },

    /// Finish an anchor whose confirmation timed out
    Resume {
        /// Record id
        id: u64,
    },

    /// Reconcile a record against the ledger
    Verify {
        /// Record id
        id: u64,
    },

    /// Show a decrypted record
    Show {
        /// Record id
        id: u64,
    },

    /// List your records
    List,

    /// Read the ledger directly
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },

    /// View and verify the audit chain
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// View and validate configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// Read the record at a ledger index
    Get {
        /// Ledger index
        index: u64,
    },
    /// Read the record written by a transaction
    Tx {
        /// Transaction hash
        tx_hash: String,
    },
    /// Number of records on the ledger
    Count,
}

#[derive(Subcommand)]
enum AuditCommands {
    /// List audit entries
    List {
        /// Show only the most recent N entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Verify audit chain integrity
    Verify,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show resolved configuration with source annotations
    Show {
        /// Show only one section (storage, cipher, ledger, audit, logging)
        #[arg(short, long)]
        section: Option<String>,
    },
    /// Validate the current configuration
    Validate,
}

impl Cli {
    fn actor(&self) -> Result<ActorId> {
        self.actor
            .map(ActorId::new)
            .ok_or_else(|| anyhow!("--actor (or EVIDENTIA_ACTOR) is required"))
    }
}

fn init_logging(cli: &Cli, loaded: Option<&evidentia_config::ResolvedConfig>) {
    let mut log_config = match loaded {
        Some(resolved) => context::to_log_config(resolved),
        None => evidentia_telemetry::LogConfig::new("warn"),
    };
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = evidentia_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", theme::Theme::error(&format!("{e:#}")));
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let loaded = Config::load(cli.config.as_deref());
    init_logging(&cli, loaded.as_ref().ok());

    let format = cli.format;
    match &cli.command {
        Commands::Keygen => {
            keygen::keygen();
            return Ok(ExitCode::SUCCESS);
        },
        Commands::Config {
            command: ConfigCommands::Validate,
        } => return Ok(config::validate(&loaded)),
        _ => {},
    }

    let resolved = loaded?;
    match cli.command {
        Commands::Keygen
        | Commands::Config {
            command: ConfigCommands::Validate,
        } => Ok(ExitCode::SUCCESS),
        Commands::Config {
            command: ConfigCommands::Show { ref section },
        } => config::show(&resolved, format == OutputFormat::Json, section.as_deref()),
        Commands::Ledger { ref command } => {
            let client = context::connect_ledger(&resolved)?;
            match command {
                LedgerCommands::Get { index } => ledger::get(client.as_ref(), *index, format).await,
                LedgerCommands::Tx { tx_hash } => {
                    ledger::by_tx(client.as_ref(), tx_hash, format).await
                },
                LedgerCommands::Count => ledger::count(client.as_ref(), format).await,
            }
        },
        Commands::Audit { ref command } => {
            let app = App::open(resolved)?;
            match command {
                AuditCommands::List { limit } => audit::list(app.store.audit(), *limit, format).await,
                AuditCommands::Verify => audit::verify(app.store.audit(), format).await,
            }
        },
        Commands::Capture {
            ref input,
            ref classification,
            confidence,
            ref submitted_text,
        } => {
            let actor = cli.actor()?;
            let app = App::open(resolved)?;
            let args = evidence::CaptureArgs {
                input: input.as_deref(),
                classification: classification.clone(),
                confidence,
                submitted_text: submitted_text.clone(),
            };
            evidence::capture(&app.store, actor, args, format).await
        },
        Commands::Anchor { id } => {
            let actor = cli.actor()?;
            let app = App::open(resolved)?.with_ledger()?;
            evidence::anchor(&app.store, actor, RecordId(id), format).await
        },
        Commands::Resume { id } => {
            let actor = cli.actor()?;
            let app = App::open(resolved)?.with_ledger()?;
            evidence::resume(&app.store, actor, RecordId(id), format).await
        },
        Commands::Verify { id } => {
            let actor = cli.actor()?;
            let app = App::open(resolved)?.with_ledger()?;
            evidence::verify(&app.store, actor, RecordId(id), format).await
        },
        Commands::Show { id } => {
            let actor = cli.actor()?;
            let app = App::open(resolved)?;
            evidence::show(&app.store, actor, RecordId(id), format).await
        },
        Commands::List => {
            let actor = cli.actor()?;
            let app = App::open(resolved)?;
            evidence::list(&app.store, actor, format).await
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_parse_capture_with_classification() {
        let cli = Cli::try_parse_from([
            "evidentia",
            "--actor",
            "7",
            "capture",
            "post.json",
            "--classification",
            "threat",
            "--confidence",
            "0.875",
        ])
        .unwrap();
        assert_eq!(cli.actor().unwrap(), ActorId::new(7));
        assert!(matches!(
            cli.command,
            Commands::Capture { confidence: Some(c), .. } if c == 0.875
        ));
    }

    #[test]
    fn test_confidence_requires_classification() {
        assert!(Cli::try_parse_from(["evidentia", "capture", "--confidence", "0.5"]).is_err());
    }

    #[test]
    fn test_ledger_and_audit_subcommands_parse() {
        let cli = Cli::try_parse_from(["evidentia", "--format", "json", "ledger", "tx", "0xab"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::Ledger { command: LedgerCommands::Tx { ref tx_hash } } if tx_hash == "0xab"
        ));

        let cli = Cli::try_parse_from(["evidentia", "audit", "list", "-n", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Audit { command: AuditCommands::List { limit: Some(5) } }
        ));
    }
}
