//! In-memory table store for testing.

use crate::error::{StorageError, StorageResult};
use crate::table::{validate_table_name, Document, TableStore};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct Tables {
    tables: HashMap<String, BTreeMap<String, Value>>,
    /// Encoded size of each document, for quota accounting.
    sizes: HashMap<(String, String), u64>,
    used_bytes: u64,
}

/// An in-memory table store.
///
/// Suitable for unit and integration tests and for ephemeral replicas. An
/// optional byte quota reproduces the storage-full failures a browser or
/// mobile store produces, so callers can exercise their error paths.
///
/// # Example
///
/// ```rust
/// use meetsync_storage::{InMemoryTableStore, StorageError, TableStore};
/// use serde_json::json;
///
/// let store = InMemoryTableStore::with_quota(8);
/// let err = store.put("t", "k", json!("far too long for the quota")).unwrap_err();
/// assert!(matches!(err, StorageError::QuotaExceeded { .. }));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryTableStore {
    inner: RwLock<Tables>,
    quota: RwLock<Option<u64>>,
}

impl InMemoryTableStore {
    /// Creates an empty store with no quota.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store limited to `quota` bytes of encoded documents.
    #[must_use]
    pub fn with_quota(quota: u64) -> Self {
        Self {
            inner: RwLock::default(),
            quota: RwLock::new(Some(quota)),
        }
    }

    /// Sets or clears the byte quota. Existing documents are kept even if
    /// they exceed a newly lowered quota.
    pub fn set_quota(&self, quota: Option<u64>) {
        *self.quota.write() = quota;
    }

    /// Bytes currently used by encoded documents.
    pub fn used_bytes(&self) -> u64 {
        self.inner.read().used_bytes
    }

    /// Names of tables that hold at least one document.
    pub fn table_names(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<String> = inner
            .tables
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn encoded_len(document: &Value) -> StorageResult<u64> {
        Ok(serde_json::to_vec(document)?.len() as u64)
    }

    fn check_quota(&self, requested: u64) -> StorageResult<()> {
        match *self.quota.read() {
            Some(quota) if requested > quota => {
                Err(StorageError::QuotaExceeded { requested, quota })
            }
            _ => Ok(()),
        }
    }
}

impl TableStore for InMemoryTableStore {
    fn scan(&self, table: &str) -> StorageResult<Vec<Document>> {
        validate_table_name(table)?;
        let inner = self.inner.read();
        Ok(inner
            .tables
            .get(table)
            .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn get(&self, table: &str, key: &str) -> StorageResult<Option<Value>> {
        validate_table_name(table)?;
        let inner = self.inner.read();
        Ok(inner.tables.get(table).and_then(|docs| docs.get(key)).cloned())
    }

    fn put(&self, table: &str, key: &str, document: Value) -> StorageResult<()> {
        self.put_batch(table, vec![(key.to_owned(), document)])
            .map(|_| ())
    }

    fn put_batch(&self, table: &str, documents: Vec<Document>) -> StorageResult<usize> {
        validate_table_name(table)?;
        let mut inner = self.inner.write();

        // Size the whole batch before touching anything.
        let mut sized = Vec::with_capacity(documents.len());
        let mut pending: HashMap<&str, u64> = HashMap::new();
        let mut requested = inner.used_bytes;
        for (key, document) in &documents {
            let len = Self::encoded_len(document)?;
            let previous = match pending.get(key.as_str()) {
                Some(len) => *len,
                None => inner
                    .sizes
                    .get(&(table.to_owned(), key.clone()))
                    .copied()
                    .unwrap_or(0),
            };
            requested = requested.saturating_sub(previous).saturating_add(len);
            pending.insert(key.as_str(), len);
            sized.push(len);
        }
        self.check_quota(requested)?;

        let count = documents.len();
        for ((key, document), len) in documents.into_iter().zip(sized) {
            inner.sizes.insert((table.to_owned(), key.clone()), len);
            inner
                .tables
                .entry(table.to_owned())
                .or_default()
                .insert(key, document);
        }
        inner.used_bytes = requested;
        Ok(count)
    }

    fn remove(&self, table: &str, key: &str) -> StorageResult<bool> {
        validate_table_name(table)?;
        let mut inner = self.inner.write();
        let removed = inner
            .tables
            .get_mut(table)
            .and_then(|docs| docs.remove(key))
            .is_some();
        if let Some(len) = inner.sizes.remove(&(table.to_owned(), key.to_owned())) {
            inner.used_bytes = inner.used_bytes.saturating_sub(len);
        }
        Ok(removed)
    }

    fn len(&self, table: &str) -> StorageResult<usize> {
        validate_table_name(table)?;
        Ok(self.inner.read().tables.get(table).map_or(0, BTreeMap::len))
    }
}
