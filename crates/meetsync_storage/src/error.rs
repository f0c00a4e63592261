//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A document or table file could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The write would exceed the configured storage quota.
    #[error("storage quota exceeded: {requested} bytes requested, {quota} bytes allowed")]
    QuotaExceeded {
        /// Total bytes the store would hold after the write.
        requested: u64,
        /// Configured quota in bytes.
        quota: u64,
    },

    /// The table name is not usable.
    #[error("invalid table name: {0:?}")]
    InvalidTable(String),

    /// A table file exists but is not a JSON object.
    #[error("table {table} is corrupted: {message}")]
    Corrupted {
        /// Table name.
        table: String,
        /// What was wrong.
        message: String,
    },

    /// The store directory does not exist and creation was not requested.
    #[error("store directory does not exist: {0}")]
    MissingDirectory(String),

    /// Another process holds the store directory.
    #[error("store directory is locked by another process: {0}")]
    Locked(String),
}

impl StorageError {
    /// Returns true if the failure is caused by lack of space.
    pub fn is_quota(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}
