//! Cloud store errors.

use meetsync_model::{EntityKind, RemoteError};
use meetsync_storage::StorageError;
use thiserror::Error;

/// Result type for cloud store internals.
pub type CloudResult<T> = Result<T, CloudError>;

/// Failures raised inside the cloud store.
///
/// Callers see these through the [`RemoteError`] they convert into.
#[derive(Error, Debug)]
pub enum CloudError {
    /// The store has been taken offline.
    #[error("store is offline")]
    Offline,

    /// Credentials were rejected.
    #[error("credentials rejected")]
    PermissionDenied,

    /// The write quota is used up.
    #[error("write quota of {quota} exhausted")]
    WriteQuota {
        /// Configured quota.
        quota: u64,
    },

    /// A document exceeds the size limit.
    #[error("{kind} document {id} is {size} bytes, limit is {limit}")]
    DocumentTooLarge {
        /// Document kind.
        kind: EntityKind,
        /// Document id.
        id: String,
        /// Encoded size.
        size: usize,
        /// Size limit.
        limit: usize,
    },

    /// A document failed to encode or decode.
    #[error("malformed {kind} document {id}: {source}")]
    Malformed {
        /// Document kind.
        kind: EntityKind,
        /// Document id.
        id: String,
        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// An injected failure.
    #[error("injected failure: {0}")]
    Injected(RemoteError),

    /// The backing tables failed.
    #[error("backing store error: {0}")]
    Storage(#[from] StorageError),
}

impl From<CloudError> for RemoteError {
    fn from(err: CloudError) -> Self {
        let message = err.to_string();
        match err {
            CloudError::Offline => RemoteError::Network(message),
            CloudError::PermissionDenied => RemoteError::PermissionDenied(message),
            CloudError::WriteQuota { .. } | CloudError::DocumentTooLarge { .. } => {
                RemoteError::QuotaExceeded(message)
            }
            CloudError::Malformed { kind, id, source } => RemoteError::Malformed {
                kind,
                id,
                message: source.to_string(),
            },
            CloudError::Injected(remote) => remote,
            CloudError::Storage(e) if e.is_quota() => RemoteError::QuotaExceeded(message),
            CloudError::Storage(_) => RemoteError::Unavailable(message),
        }
    }
}
