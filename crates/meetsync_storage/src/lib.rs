//! # meetsync storage
//!
//! Local durable table stores for meetsync.
//!
//! A table store holds JSON documents grouped into named tables and keyed by
//! string. It knows nothing about records, timestamps or merge rules; the
//! engine owns all interpretation of the documents.
//!
//! ## Design Principles
//!
//! - Writes are all-or-nothing per call, including batches
//! - Documents may be arbitrarily large (binary attachments included)
//! - Must be `Send + Sync`; all methods take `&self`
//!
//! ## Available Backends
//!
//! - [`InMemoryTableStore`] - For testing, with an optional byte quota
//! - [`FileTableStore`] - One JSON file per table inside a locked directory
//!
//! ## Example
//!
//! ```rust
//! use meetsync_storage::{InMemoryTableStore, TableStore};
//! use serde_json::json;
//!
//! let store = InMemoryTableStore::new();
//! store.put("meetings", "m1", json!({"title": "Kickoff"})).unwrap();
//! assert_eq!(store.get("meetings", "m1").unwrap(), Some(json!({"title": "Kickoff"})));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod table;

pub use error::{StorageError, StorageResult};
pub use file::{FileStoreOptions, FileTableStore};
pub use memory::InMemoryTableStore;
pub use table::{validate_table_name, Document, TableStore};
