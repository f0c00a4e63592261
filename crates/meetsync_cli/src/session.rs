//! Opening engines over data directories.

use meetsync_cloud::{CloudConfig, CloudStore};
use meetsync_engine::{SyncConfig, SyncEngine};
use meetsync_storage::{FileTableStore, InMemoryTableStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Engine over a local directory and a directory-backed cloud.
pub type CloudSession = SyncEngine<FileTableStore, CloudStore<FileTableStore>>;

/// Engine over a local directory with the remote replica disabled.
pub type LocalSession = SyncEngine<FileTableStore, CloudStore<InMemoryTableStore>>;

/// Each command runs once and exits, so nothing is left to settle.
fn config() -> SyncConfig {
    SyncConfig::new().with_interaction_release_delay(Duration::ZERO)
}

/// Opens the local directory and the cloud directory.
pub fn open_with_cloud(path: &Path, cloud: &Path) -> Result<CloudSession, Box<dyn std::error::Error>> {
    if path == cloud {
        return Err("Local and cloud directories must differ".into());
    }
    let local = FileTableStore::open(path)?;
    let tables = FileTableStore::open(cloud)?;
    let remote = Arc::new(CloudStore::new(tables, CloudConfig::default()));
    let engine = SyncEngine::new(config(), local, remote);
    engine.load()?;
    tracing::debug!(path = %path.display(), cloud = %cloud.display(), "session opened");
    Ok(engine)
}

/// Opens the local directory alone.
pub fn open_local(path: &Path) -> Result<LocalSession, Box<dyn std::error::Error>> {
    let local = FileTableStore::open(path)?;
    let engine = SyncEngine::new(
        config().with_remote_enabled(false),
        local,
        Arc::new(CloudStore::in_memory()),
    );
    engine.load()?;
    tracing::debug!(path = %path.display(), "local session opened");
    Ok(engine)
}
