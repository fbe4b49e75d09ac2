//! Audit command - list and verify the local audit chain.

use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use evidentia_audit::AuditChain;

use crate::OutputFormat;
use crate::theme::Theme;

/// List audit entries, newest last. `limit` keeps only the most recent.
pub(crate) async fn list(
    chain: &AuditChain,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let entries = chain.entries().await?;
    let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));
    let shown = entries.get(skip..).unwrap_or_default();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(shown)?);
        return Ok(ExitCode::SUCCESS);
    }
    if shown.is_empty() {
        println!("{}", Theme::info("No audit entries"));
        return Ok(ExitCode::SUCCESS);
    }

    println!("\n{}", Theme::header("Audit Entries"));
    println!(
        "{:>5} {:<26} {:>6} {:<20} {:<14} {}",
        "SEQ".dimmed(),
        "TIMESTAMP".dimmed(),
        "ACTOR".dimmed(),
        "ACTION".dimmed(),
        "HASH".dimmed(),
        "DETAILS".dimmed()
    );
    println!("{}", Theme::separator());
    for entry in shown {
        println!(
            "{:>5} {:<26} {:>6} {:<20} {:<14} {}",
            entry.sequence,
            Theme::dimmed(&entry.timestamp),
            entry.actor,
            entry.action,
            Theme::short_hash(&entry.entry_hash),
            entry.details
        );
    }
    println!();
    Ok(ExitCode::SUCCESS)
}

/// Walk the chain and report the first break.
pub(crate) async fn verify(chain: &AuditChain, format: OutputFormat) -> Result<ExitCode> {
    let total = chain.len().await?;
    let first_break = chain.verify_chain().await?;

    if format == OutputFormat::Json {
        println!(
            "{}",
            serde_json::json!({
                "entries": total,
                "intact": first_break.is_none(),
                "first_break": first_break,
            })
        );
    } else {
        match first_break {
            None => println!(
                "{}",
                Theme::success(&format!("Audit chain intact: {total} entries"))
            ),
            Some(index) => println!(
                "{}",
                Theme::error(&format!(
                    "Audit chain broken at entry {index} of {total}; entries from there on are untrusted"
                ))
            ),
        }
    }

    Ok(if first_break.is_none() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidentia_audit::AuditAction;
    use evidentia_core::ActorId;

    #[tokio::test]
    async fn test_verify_reports_intact_chain() {
        let chain = AuditChain::in_memory();
        chain
            .append(ActorId::new(1), AuditAction::EvidenceViewed, "record:1")
            .await
            .unwrap();
        let code = verify(&chain, OutputFormat::Json).await.unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[tokio::test]
    async fn test_list_with_limit_on_empty_chain() {
        let chain = AuditChain::in_memory();
        let code = list(&chain, Some(5), OutputFormat::Pretty).await.unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }
}
