//! Sync command implementation.

use super::CommandResult;
use meetsync_engine::{SyncEngine, SyncReport};
use meetsync_model::RemoteStore;
use meetsync_storage::TableStore;

/// Runs one full sync pass and prints the report.
pub fn run<B: TableStore, S: RemoteStore>(
    engine: &SyncEngine<B, S>,
    format: &str,
) -> CommandResult<SyncReport> {
    let report = engine.full_sync()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(report)
}

fn print_text_output(report: &SyncReport) {
    println!("Sync complete in {:?}", report.duration);
    println!("  Uploaded:   {}", report.uploaded);
    println!("  Downloaded: {}", report.downloaded);
    println!();
    for (kind, counts) in &report.record_counts {
        println!(
            "  {:<14}{} live, {} deleted",
            kind.to_string(),
            counts.live,
            counts.tombstones
        );
    }

    if !report.failed_uploads.is_empty() {
        println!();
        println!("Failed uploads (retried next sync):");
        for failure in &report.failed_uploads {
            println!("  {} {}: {}", failure.kind, failure.id, failure.error);
        }
    }
}
