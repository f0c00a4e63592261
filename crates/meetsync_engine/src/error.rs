//! Error types for the sync engine.

use meetsync_model::{EntityKind, RecordId, RemoteError};
use meetsync_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
///
/// Local failures (storage, encoding) risk data loss and are always surfaced.
/// Remote failures are only returned where the operation cannot proceed
/// without the remote replica, such as fetching it during a full sync.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The local record store failed.
    #[error("local store error: {0}")]
    Storage(#[from] StorageError),

    /// A record could not be converted to or from its stored form.
    #[error("cannot encode {kind} record {id}: {source}")]
    Encoding {
        /// Record kind.
        kind: EntityKind,
        /// Record id.
        id: RecordId,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// The remote store failed.
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// Another full sync holds the sync lock.
    #[error("a sync pass is already running")]
    SyncInProgress,

    /// The record does not exist or is deleted.
    #[error("{kind} record {id} not found")]
    NotFound {
        /// Record kind.
        kind: EntityKind,
        /// Record id.
        id: RecordId,
    },

    /// A merge produced fewer records than one of its inputs.
    #[error("merge of {kind} shrank the record set: merged={merged}, local={local}, remote={remote}")]
    MergeInvariant {
        /// Record kind.
        kind: EntityKind,
        /// Merged size.
        merged: usize,
        /// Local input size.
        local: usize,
        /// Remote input size.
        remote: usize,
    },

    /// A background thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Returns true if the failure happened in the local durable store.
    pub fn is_local(&self) -> bool {
        matches!(self, EngineError::Storage(_) | EngineError::Encoding { .. })
    }

    /// Returns true if the next sync pass may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Remote(e) => e.is_retryable(),
            EngineError::SyncInProgress => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_errors() {
        let err = EngineError::Storage(StorageError::QuotaExceeded {
            requested: 2,
            quota: 1,
        });
        assert!(err.is_local());
        assert!(!err.is_retryable());

        let err = EngineError::Remote(RemoteError::Network("reset".into()));
        assert!(!err.is_local());
        assert!(err.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = EngineError::NotFound {
            kind: EntityKind::Meeting,
            id: "m1".into(),
        };
        assert_eq!(err.to_string(), "meetings record m1 not found");

        let err = EngineError::MergeInvariant {
            kind: EntityKind::Category,
            merged: 1,
            local: 2,
            remote: 0,
        };
        assert!(err.to_string().contains("merged=1"));
        assert_eq!(EngineError::SyncInProgress.to_string(), "a sync pass is already running");
    }
}
