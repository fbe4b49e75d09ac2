//! Direct ledger reads.

use std::process::ExitCode;

use anyhow::Result;
use evidentia_ledger::{AnchoredRecord, LedgerAnchor};

use crate::OutputFormat;
use crate::theme::Theme;

fn print_record(anchored: &AnchoredRecord, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(anchored)?);
        return Ok(());
    }

    let record = &anchored.record;
    let self_consistent = record
        .recompute_hash()
        .is_ok_and(|h| h.to_hex() == record.content_hash);

    println!("\n{}", Theme::header(&format!("Ledger record #{}", anchored.index)));
    if let Some(tx) = &anchored.tx_hash {
        println!("{}", Theme::kv("Transaction", tx));
    }
    println!("{}", Theme::kv("Content hash", &record.content_hash));
    println!("{}", Theme::kv("Post", &record.post_id));
    println!("{}", Theme::kv("Posted", &record.timestamp));
    println!("{}", Theme::kv("Investigator", &record.investigator));
    println!("{}", Theme::kv("Author", &record.author_handle));
    println!("{}", Theme::kv("Content", &record.content));
    for url in &record.media_urls {
        println!("{}", Theme::kv("Media", url));
    }
    println!(
        "{}",
        Theme::kv(
            "Class",
            &format!("{} ({})", record.classification, record.confidence)
        )
    );
    if self_consistent {
        println!("{}", Theme::success("Stored hash matches the stored fields"));
    } else {
        println!("{}", Theme::error("Stored hash does not match the stored fields"));
    }
    println!();
    Ok(())
}

/// Read the record at `index`.
pub(crate) async fn get(
    ledger: &dyn LedgerAnchor,
    index: u64,
    format: OutputFormat,
) -> Result<ExitCode> {
    let anchored = ledger.fetch_by_index(index).await?;
    print_record(&anchored, format)?;
    Ok(ExitCode::SUCCESS)
}

/// Read the record written by `tx_hash`.
pub(crate) async fn by_tx(
    ledger: &dyn LedgerAnchor,
    tx_hash: &str,
    format: OutputFormat,
) -> Result<ExitCode> {
    let anchored = ledger.fetch_by_tx_hash(tx_hash).await?;
    print_record(&anchored, format)?;
    Ok(ExitCode::SUCCESS)
}

/// Print the number of records on the ledger.
pub(crate) async fn count(ledger: &dyn LedgerAnchor, format: OutputFormat) -> Result<ExitCode> {
    let count = ledger.evidence_count().await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "count": count })),
        OutputFormat::Pretty => println!("{}", Theme::kv("Records", &count.to_string())),
    }
    Ok(ExitCode::SUCCESS)
}
