//! Evidence commands: capture, anchor, resume, verify, show, list.

use std::io::Read as _;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use evidentia_core::{ActorId, Classification, EvidenceInput, RecordId};
use evidentia_evidence::{AnchorOutcome, EvidenceStore, EvidenceView, VerificationStatus};

use crate::OutputFormat;
use crate::theme::Theme;

/// Exit code for an outcome that needs a follow-up rather than a fix.
const EXIT_PENDING: u8 = 2;

/// Options for `capture`.
pub(crate) struct CaptureArgs<'a> {
    pub(crate) input: Option<&'a Path>,
    pub(crate) classification: Option<String>,
    pub(crate) confidence: Option<f64>,
    pub(crate) submitted_text: Option<String>,
}

/// Read a JSON payload from a file, or stdin when `path` is `None` or `-`.
fn read_payload(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p.as_os_str() != "-" => std::fs::read_to_string(p)
            .with_context(|| format!("cannot read {}", p.display())),
        _ => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("cannot read evidence payload from stdin")?;
            Ok(raw)
        },
    }
}

fn classification(category: Option<String>, confidence: Option<f64>) -> Result<Option<Classification>> {
    match (category, confidence) {
        (Some(category), Some(confidence)) => Ok(Some(Classification::new(category, confidence)?)),
        (None, None) => Ok(None),
        _ => bail!("--classification and --confidence must be given together"),
    }
}

/// Parse a payload and store it as a new mirror row.
pub(crate) async fn capture(
    store: &EvidenceStore,
    actor: ActorId,
    args: CaptureArgs<'_>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let mut input = EvidenceInput::from_json(&read_payload(args.input)?)?;
    if let Some(text) = args.submitted_text {
        match &mut input {
            EvidenceInput::V1(v1) => v1.submitted_text = Some(text),
        }
    }
    let classification = classification(args.classification, args.confidence)?;

    let id = store.create(input, actor, classification).await?;
    let view = store.get(id, actor).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        OutputFormat::Pretty => {
            println!("{}", Theme::success(&format!("Captured {id}")));
            match view.submitted_text_matches {
                Some(true) => println!("{}", Theme::info("Submitted text matches the post")),
                Some(false) => println!(
                    "{}",
                    Theme::warning("Submitted text differs from the captured post")
                ),
                None => {},
            }
        },
    }
    Ok(ExitCode::SUCCESS)
}

fn print_outcome(id: RecordId, outcome: &AnchorOutcome, format: OutputFormat) -> Result<ExitCode> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    }
    let code = match outcome {
        AnchorOutcome::Anchored {
            pointer,
            content_hash,
        } => {
            if format == OutputFormat::Pretty {
                println!("{}", Theme::success(&format!("Anchored {id}")));
                println!("{}", Theme::kv("Ledger index", &pointer.index.to_string()));
                println!("{}", Theme::kv("Transaction", &pointer.tx_hash));
                println!("{}", Theme::kv("Content hash", content_hash));
            }
            ExitCode::SUCCESS
        },
        AnchorOutcome::Pending { tx_hash } => {
            if format == OutputFormat::Pretty {
                println!(
                    "{}",
                    Theme::warning(&format!("Not confirmed yet; transaction {tx_hash}"))
                );
                println!(
                    "{}",
                    Theme::dimmed(&format!("Run `evidentia resume {}` later.", id.0))
                );
            }
            ExitCode::from(EXIT_PENDING)
        },
        AnchorOutcome::Rejected { tx_hash, reason } => {
            if format == OutputFormat::Pretty {
                println!(
                    "{}",
                    Theme::error(&format!("Ledger rejected {tx_hash}: {reason}"))
                );
                println!("{}", Theme::dimmed("Retrying the same payload will not help."));
            }
            ExitCode::FAILURE
        },
        AnchorOutcome::Unavailable { reason } => {
            if format == OutputFormat::Pretty {
                println!("{}", Theme::error(&format!("Ledger unavailable: {reason}")));
                println!("{}", Theme::dimmed("Nothing was sent; safe to retry."));
            }
            ExitCode::FAILURE
        },
    };
    Ok(code)
}

/// Anchor a record's canonical hash on the ledger.
pub(crate) async fn anchor(
    store: &EvidenceStore,
    actor: ActorId,
    id: RecordId,
    format: OutputFormat,
) -> Result<ExitCode> {
    let outcome = store.anchor(id, actor).await?;
    print_outcome(id, &outcome, format)
}

/// Finish an anchor whose confirmation timed out.
pub(crate) async fn resume(
    store: &EvidenceStore,
    actor: ActorId,
    id: RecordId,
    format: OutputFormat,
) -> Result<ExitCode> {
    let outcome = store.resume_anchor(id, actor).await?;
    print_outcome(id, &outcome, format)
}

/// Reconcile a record against the ledger.
pub(crate) async fn verify(
    store: &EvidenceStore,
    actor: ActorId,
    id: RecordId,
    format: OutputFormat,
) -> Result<ExitCode> {
    let report = store.verify(id, actor).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Pretty => {
            println!("\n{}  {}", Theme::header(&format!("{id}")), Theme::status(report.status));
            if let Some(pointer) = &report.ledger {
                println!("{}", Theme::kv("Ledger", &pointer.to_string()));
            }
            let none = || "-".to_string();
            println!(
                "{}",
                Theme::kv("Anchored", &report.anchored_hash.clone().unwrap_or_else(none))
            );
            println!(
                "{}",
                Theme::kv("On-chain", &report.on_chain_hash.clone().unwrap_or_else(none))
            );
            println!(
                "{}",
                Theme::kv("Recomputed", &report.calculated_hash.clone().unwrap_or_else(none))
            );
            println!();
        },
    }

    Ok(match report.status {
        VerificationStatus::Verified => ExitCode::SUCCESS,
        VerificationStatus::Tampered => ExitCode::FAILURE,
        VerificationStatus::Skipped => ExitCode::from(EXIT_PENDING),
    })
}

fn print_view(view: &EvidenceView) {
    println!("\n{}", Theme::header(&format!("{}", view.id)));
    println!("{}", Theme::kv("Post", &format!("{} ({})", view.post_id, view.platform)));
    println!("{}", Theme::kv("Author", &view.author_handle));
    println!("{}", Theme::kv("Posted", &view.timestamp));
    println!("{}", Theme::kv("Captured", &view.captured_at));
    println!("{}", Theme::kv("Content", &view.content));
    for url in &view.media_urls {
        println!("{}", Theme::kv("Media", url));
    }
    if let Some(c) = &view.classification {
        println!("{}", Theme::kv("Class", &format!("{} ({:.4})", c.category, c.confidence)));
    }
    match (&view.ledger, &view.pending_tx) {
        (Some(pointer), _) => println!("{}", Theme::kv("Ledger", &pointer.to_string())),
        (None, Some(tx)) => println!("{}", Theme::kv("Pending", tx)),
        (None, None) if view.submitting => println!("{}", Theme::kv("Ledger", "submitting")),
        (None, None) => println!("{}", Theme::kv("Ledger", "not anchored")),
    }
    println!("{}", Theme::kv("Status", &Theme::flag(view.verified)));
    println!();
}

/// Show one decrypted record.
pub(crate) async fn show(
    store: &EvidenceStore,
    actor: ActorId,
    id: RecordId,
    format: OutputFormat,
) -> Result<ExitCode> {
    let view = store.get(id, actor).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        OutputFormat::Pretty => print_view(&view),
    }
    Ok(ExitCode::SUCCESS)
}

/// List the actor's records.
pub(crate) async fn list(
    store: &EvidenceStore,
    actor: ActorId,
    format: OutputFormat,
) -> Result<ExitCode> {
    let views = store.list(actor).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(ExitCode::SUCCESS);
    }
    if views.is_empty() {
        println!("{}", Theme::info("No evidence captured by this investigator"));
        return Ok(ExitCode::SUCCESS);
    }

    println!("\n{}", Theme::header("Evidence"));
    println!(
        "{:>6}  {:<20} {:<16} {:<14} {}",
        "ID".dimmed(),
        "POST".dimmed(),
        "AUTHOR".dimmed(),
        "LEDGER".dimmed(),
        "STATUS".dimmed()
    );
    println!("{}", Theme::separator());
    for view in &views {
        let ledger = match (&view.ledger, &view.pending_tx) {
            (Some(pointer), _) => format!("#{}", pointer.index),
            (None, Some(_)) => "pending".to_string(),
            (None, None) if view.submitting => "submitting".to_string(),
            (None, None) => "-".to_string(),
        };
        println!(
            "{:>6}  {:<20} {:<16} {:<14} {}",
            view.id.0,
            view.post_id,
            view.author_handle,
            ledger,
            Theme::flag(view.verified)
        );
    }
    println!();
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_needs_both_flags() {
        assert!(classification(None, None).unwrap().is_none());
        assert!(classification(Some("threat".into()), None).is_err());
        assert!(classification(None, Some(0.5)).is_err());
        let c = classification(Some("threat".into()), Some(0.875)).unwrap().unwrap();
        assert_eq!(c.category, "threat");
    }

    #[test]
    fn test_classification_rejects_out_of_range_confidence() {
        assert!(classification(Some("threat".into()), Some(1.5)).is_err());
    }

    #[test]
    fn test_read_payload_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post.json");
        std::fs::write(&path, "{\"version\":1}").unwrap();
        assert_eq!(read_payload(Some(&path)).unwrap(), "{\"version\":1}");
        assert!(read_payload(Some(&dir.path().join("missing.json"))).is_err());
    }
}
