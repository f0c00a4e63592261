//! Sync pass state, statistics and reports.

use meetsync_model::{EntityKind, RecordId, RemoteError, Timestamp};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;

/// Phase of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    /// No pass has run yet.
    Idle,
    /// Fetching both replicas.
    Fetching,
    /// Sending records the remote replica is missing.
    Uploading,
    /// Writing the merged sets to the local store.
    Persisting,
    /// The last pass completed.
    Synced,
    /// The last pass failed.
    Error,
}

impl SyncState {
    /// Returns true while a pass is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Fetching | SyncState::Uploading | SyncState::Persisting
        )
    }
}

/// Cumulative statistics across sync passes.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Passes that completed.
    pub passes_completed: u64,
    /// Records uploaded.
    pub records_uploaded: u64,
    /// Records the local replica received.
    pub records_downloaded: u64,
    /// Uploads that failed.
    pub failed_uploads: u64,
    /// Passes rejected because another one was running.
    pub busy_rejections: u64,
    /// Time of the last completed pass.
    pub last_sync_time: Option<Timestamp>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Record counts for one kind after a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCounts {
    /// Every record, tombstones included.
    pub total: usize,
    /// Records not deleted.
    pub live: usize,
    /// Deleted records.
    pub tombstones: usize,
}

/// An upload that the remote store rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFailure {
    /// Record kind.
    pub kind: EntityKind,
    /// Record id.
    pub id: RecordId,
    /// Why the upload failed.
    #[serde(serialize_with = "serialize_display")]
    pub error: RemoteError,
}

/// Outcome of one full sync pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Whether the pass completed. Failed uploads do not clear this.
    pub success: bool,
    /// Records uploaded.
    pub uploaded: usize,
    /// Records the local replica received.
    pub downloaded: usize,
    /// Merged record counts per kind.
    pub record_counts: BTreeMap<EntityKind, RecordCounts>,
    /// Uploads that failed and will be retried by the next pass.
    pub failed_uploads: Vec<UploadFailure>,
    /// Wall-clock duration of the pass.
    pub duration: Duration,
}

impl SyncReport {
    pub(crate) fn new() -> Self {
        Self {
            success: false,
            uploaded: 0,
            downloaded: 0,
            record_counts: BTreeMap::new(),
            failed_uploads: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Returns true if every upload went through.
    pub fn is_complete(&self) -> bool {
        self.success && self.failed_uploads.is_empty()
    }

    /// Counts for one kind.
    pub fn counts(&self, kind: EntityKind) -> RecordCounts {
        self.record_counts.get(&kind).copied().unwrap_or_default()
    }
}

fn serialize_display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
