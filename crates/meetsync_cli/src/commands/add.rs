//! Add command implementations.

use super::CommandResult;
use meetsync_engine::{MutationReceipt, Published, SyncEngine};
use meetsync_model::{Blob, MeetingFields, RecordId, RemoteStore, Timestamp};
use meetsync_storage::TableStore;
use std::path::Path;

/// MIME type recorded for attached audio.
const AUDIO_MIME: &str = "audio/webm";

/// Builds meeting fields from command-line arguments, reading the audio
/// attachment if one is given.
pub fn meeting_fields(
    title: String,
    notes: String,
    scheduled_at: Option<i64>,
    stakeholders: Vec<String>,
    categories: Vec<String>,
    audio: Option<&Path>,
) -> CommandResult<MeetingFields> {
    let audio = match audio {
        Some(path) => {
            let data = std::fs::read(path)
                .map_err(|e| format!("Cannot read audio file {}: {e}", path.display()))?;
            Some(Blob::new(AUDIO_MIME, data))
        }
        None => None,
    };
    Ok(MeetingFields {
        title,
        notes,
        scheduled_at: scheduled_at.map(Timestamp::from_millis),
        stakeholder_ids: stakeholders.into_iter().map(RecordId::from).collect(),
        category_ids: categories.into_iter().map(RecordId::from).collect(),
        audio,
        ..MeetingFields::default()
    })
}

/// Runs an add command.
pub fn run<B: TableStore, S: RemoteStore, R: Published>(
    engine: &SyncEngine<B, S>,
    fields: R::Fields,
) -> CommandResult<MutationReceipt<R>> {
    let receipt = engine.mutations().add::<R>(fields)?;
    println!("Added {} to {}", receipt.record.id(), R::KIND);
    if let Some(e) = &receipt.remote_error {
        println!("  not synced: {e}");
    }
    Ok(receipt)
}
