//! Delete command implementation.

use super::CommandResult;
use meetsync_engine::{MutationReceipt, Published, SyncEngine};
use meetsync_model::{Category, EntityKind, Meeting, RecordId, RemoteError, RemoteStore, Stakeholder};
use meetsync_storage::TableStore;

/// Runs the delete command.
///
/// The record is marked deleted locally and the flag is pushed to the cloud
/// when it is reachable. Nothing is ever removed from either replica.
pub fn run<B: TableStore, S: RemoteStore>(
    engine: &SyncEngine<B, S>,
    kind: EntityKind,
    id: &str,
) -> CommandResult<()> {
    let id = RecordId::from(id);
    let remote_error = match kind {
        EntityKind::Meeting => delete::<_, _, Meeting>(engine, &id)?.remote_error,
        EntityKind::Stakeholder => delete::<_, _, Stakeholder>(engine, &id)?.remote_error,
        EntityKind::Category => delete::<_, _, Category>(engine, &id)?.remote_error,
    };
    report(kind, &id, remote_error.as_ref());
    Ok(())
}

fn delete<B: TableStore, S: RemoteStore, R: Published>(
    engine: &SyncEngine<B, S>,
    id: &RecordId,
) -> CommandResult<MutationReceipt<R>> {
    Ok(engine.mutations().soft_delete::<R>(id)?)
}

fn report(kind: EntityKind, id: &RecordId, remote_error: Option<&RemoteError>) {
    println!("Deleted {id} from {kind}");
    if let Some(e) = remote_error {
        println!("  not synced: {e}");
    }
}
