//! File-based table store for persistent storage.
//!
//! Directory layout:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK              # Advisory lock for single-process access
//! ├─ meetings.json     # One JSON object per table: { key: document }
//! ├─ stakeholders.json
//! └─ categories.json
//! ```
//!
//! Every write rewrites the affected table into `<table>.json.tmp` and
//! renames it over the old file, so a crash leaves either the old or the new
//! table, never a torn one.

use crate::error::{StorageError, StorageResult};
use crate::table::{validate_table_name, Document, TableStore};
use fs2::FileExt;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const TABLE_EXT: &str = "json";

/// Options for opening a [`FileTableStore`].
#[derive(Debug, Clone)]
pub struct FileStoreOptions {
    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,
    /// Whether to fsync table files after every write.
    pub sync_on_write: bool,
}

impl Default for FileStoreOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
        }
    }
}

impl FileStoreOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync after every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }
}

type Table = BTreeMap<String, Value>;

/// A table store persisted as one JSON file per table.
///
/// Tables are loaded lazily and cached. The store holds an exclusive lock on
/// its directory for its whole lifetime, so two processes cannot interleave
/// table rewrites.
///
/// # Example
///
/// ```no_run
/// use meetsync_storage::{FileTableStore, TableStore};
/// use std::path::Path;
///
/// let store = FileTableStore::open(Path::new("data")).unwrap();
/// store.put("meetings", "m1", serde_json::json!({"title": "Kickoff"})).unwrap();
/// ```
#[derive(Debug)]
pub struct FileTableStore {
    path: PathBuf,
    options: FileStoreOptions,
    cache: RwLock<HashMap<String, Table>>,
    _lock_file: File,
}

impl FileTableStore {
    /// Opens or creates a store with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or another
    /// process holds its lock.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with_options(path, FileStoreOptions::default())
    }

    /// Opens a store with explicit options.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `Locked`)
    /// - I/O errors occur
    pub fn open_with_options(path: &Path, options: FileStoreOptions) -> StorageResult<Self> {
        if !path.exists() {
            if options.create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::MissingDirectory(path.display().to_string()));
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }

        tracing::debug!(path = %path.display(), "opened file table store");
        Ok(Self {
            path: path.to_path_buf(),
            options,
            cache: RwLock::new(HashMap::new()),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.path.join(format!("{table}.{TABLE_EXT}"))
    }

    fn load_table(&self, table: &str) -> StorageResult<Table> {
        let path = self.table_path(table);
        if !path.exists() {
            return Ok(Table::new());
        }
        let reader = BufReader::new(File::open(&path)?);
        let value: Value = serde_json::from_reader(reader)?;
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(StorageError::Corrupted {
                table: table.to_owned(),
                message: format!("expected object, found {}", json_type(&other)),
            }),
        }
    }

    /// Runs `f` against the cached table, loading it first if needed.
    fn with_table<T>(&self, table: &str, f: impl FnOnce(&Table) -> T) -> StorageResult<T> {
        validate_table_name(table)?;
        if let Some(cached) = self.cache.read().get(table) {
            return Ok(f(cached));
        }
        let loaded = self.load_table(table)?;
        let mut cache = self.cache.write();
        let cached = cache.entry(table.to_owned()).or_insert(loaded);
        Ok(f(cached))
    }

    /// Applies `edit` to a copy of the table, persists it, then swaps the
    /// cache. A failed write leaves both the file and the cache unchanged.
    fn write_table<T>(&self, table: &str, edit: impl FnOnce(&mut Table) -> T) -> StorageResult<T> {
        validate_table_name(table)?;
        let mut cache = self.cache.write();
        let mut next = match cache.get(table) {
            Some(current) => current.clone(),
            None => self.load_table(table)?,
        };
        let out = edit(&mut next);
        self.persist(table, &next)?;
        cache.insert(table.to_owned(), next);
        Ok(out)
    }

    fn persist(&self, table: &str, contents: &Table) -> StorageResult<()> {
        let final_path = self.table_path(table);
        let temp_path = self.path.join(format!("{table}.{TABLE_EXT}.tmp"));

        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, contents)?;
            writer.flush()?;
            if self.options.sync_on_write {
                writer.get_ref().sync_all()?;
            }
        }

        fs::rename(&temp_path, &final_path)?;
        Ok(())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl TableStore for FileTableStore {
    fn scan(&self, table: &str) -> StorageResult<Vec<Document>> {
        self.with_table(table, |docs| {
            docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        })
    }

    fn get(&self, table: &str, key: &str) -> StorageResult<Option<Value>> {
        self.with_table(table, |docs| docs.get(key).cloned())
    }

    fn put(&self, table: &str, key: &str, document: Value) -> StorageResult<()> {
        self.write_table(table, |docs| {
            docs.insert(key.to_owned(), document);
        })
    }

    fn put_batch(&self, table: &str, documents: Vec<Document>) -> StorageResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        self.write_table(table, |docs| {
            let count = documents.len();
            docs.extend(documents);
            count
        })
    }

    fn remove(&self, table: &str, key: &str) -> StorageResult<bool> {
        self.write_table(table, |docs| docs.remove(key).is_some())
    }

    fn len(&self, table: &str) -> StorageResult<usize> {
        self.with_table(table, Table::len)
    }
}
