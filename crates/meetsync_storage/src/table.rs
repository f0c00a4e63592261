//! Table store trait definition.

use crate::error::{StorageError, StorageResult};

/// A stored document: a key and its JSON body.
pub type Document = (String, serde_json::Value);

/// A transactional JSON document table store.
///
/// # Invariants
///
/// - `put` and `put_batch` either apply completely or not at all
/// - `scan` returns documents ordered by key
/// - A failed write leaves previously stored documents untouched
///
/// # Implementors
///
/// - [`super::InMemoryTableStore`] - For testing
/// - [`super::FileTableStore`] - For persistent storage
pub trait TableStore: Send + Sync {
    /// Returns every document in `table`, ordered by key.
    ///
    /// A table that was never written is empty.
    fn scan(&self, table: &str) -> StorageResult<Vec<Document>>;

    /// Returns one document.
    fn get(&self, table: &str, key: &str) -> StorageResult<Option<serde_json::Value>>;

    /// Inserts or replaces one document.
    fn put(&self, table: &str, key: &str, document: serde_json::Value) -> StorageResult<()>;

    /// Inserts or replaces several documents atomically.
    ///
    /// Returns the number of documents written.
    fn put_batch(&self, table: &str, documents: Vec<Document>) -> StorageResult<usize>;

    /// Physically removes a document. Returns true if it existed.
    fn remove(&self, table: &str, key: &str) -> StorageResult<bool>;

    /// Number of documents in `table`.
    fn len(&self, table: &str) -> StorageResult<usize> {
        Ok(self.scan(table)?.len())
    }
}

/// Checks that a table name is non-empty and limited to `[a-z0-9_-]`.
///
/// Table names become file names in the file backend.
pub fn validate_table_name(table: &str) -> StorageResult<()> {
    let valid = !table.is_empty()
        && table
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidTable(table.to_owned()))
    }
}
