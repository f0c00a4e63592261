//! Inspect command implementation.

use super::CommandResult;
use meetsync_engine::{RecordCounts, SyncEngine};
use meetsync_model::{Entity, EntityKind, Meeting, RemoteStore};
use meetsync_storage::TableStore;
use serde::Serialize;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Whether the cloud replica is configured and reachable.
    pub remote_ready: bool,
    /// Per-kind statistics, in sync order.
    pub kinds: Vec<KindStats>,
    /// Bytes of audio and images held only in the local store.
    pub local_media_bytes: usize,
}

/// Statistics for a single kind.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindStats {
    /// Entity kind.
    pub kind: EntityKind,
    /// Stored record counts.
    #[serde(flatten)]
    pub counts: RecordCounts,
}

/// Collects the inspection result.
pub fn inspect<B: TableStore, S: RemoteStore>(
    engine: &SyncEngine<B, S>,
) -> CommandResult<InspectResult> {
    let counts = engine.local_counts()?;
    let kinds = EntityKind::ALL
        .iter()
        .map(|kind| KindStats {
            kind: *kind,
            counts: counts.get(kind).copied().unwrap_or_default(),
        })
        .collect();
    let local_media_bytes = engine
        .local()
        .get_all::<Meeting>()?
        .iter()
        .filter(|m| !m.is_deleted())
        .map(Meeting::binary_len)
        .sum();

    Ok(InspectResult {
        remote_ready: engine.remote_ready(),
        kinds,
        local_media_bytes,
    })
}

/// Runs the inspect command.
pub fn run<B: TableStore, S: RemoteStore>(
    engine: &SyncEngine<B, S>,
    format: &str,
) -> CommandResult<()> {
    let result = inspect(engine)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("meetsync Data Inspection");
    println!("========================");
    println!();
    println!(
        "Remote: {}",
        if result.remote_ready { "ready" } else { "not available" }
    );
    println!();
    println!("Records:");
    for stats in &result.kinds {
        println!(
            "  {:<14}{} live, {} deleted",
            stats.kind.to_string(),
            stats.counts.live,
            stats.counts.tombstones
        );
    }
    println!();
    println!("Local media: {}", format_size(result.local_media_bytes as u64));
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
