//! Local durable record store.
//!
//! Typed access to the per-kind tables of a [`TableStore`]. This is the
//! replica that survives restarts and is the source of truth for the UI.
//!
//! All writes go through one write gate, so a read-merge-write sequence
//! (mutations, incoming remote sets) cannot interleave with another one and
//! lose an update.

use crate::error::{EngineError, EngineResult};
use meetsync_model::{resolve_pair, Entity, RecordId, Timestamp};
use meetsync_storage::{Document, TableStore};
use parking_lot::Mutex;
use serde::Serialize;

/// Result of a bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPutOutcome {
    /// Number of records written.
    pub saved_count: usize,
}

/// Typed record store over a table backend.
#[derive(Debug)]
pub struct RecordStore<B: TableStore> {
    backend: B,
    write_gate: Mutex<()>,
}

impl<B: TableStore> RecordStore<B> {
    /// Wraps a table backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            write_gate: Mutex::new(()),
        }
    }

    /// The underlying table backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns every stored record of a kind, tombstones included.
    ///
    /// Documents that no longer decode are logged and skipped rather than
    /// failing the whole read.
    pub fn get_all<R: Entity>(&self) -> EngineResult<Vec<R>> {
        let documents = self.backend.scan(R::KIND.table_name())?;
        let mut records = Vec::with_capacity(documents.len());
        for (key, value) in documents {
            match serde_json::from_value::<R>(value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(kind = %R::KIND, id = %key, error = %e, "skipping undecodable record");
                }
            }
        }
        Ok(records)
    }

    /// Returns one record, tombstones included.
    pub fn get<R: Entity>(&self, id: &RecordId) -> EngineResult<Option<R>> {
        match self.backend.get(R::KIND.table_name(), id.as_str())? {
            Some(value) => decode(id, value).map(Some),
            None => Ok(None),
        }
    }

    /// Inserts or replaces one record.
    pub fn put<R: Entity>(&self, record: &R) -> EngineResult<()> {
        let value = encode(record)?;
        let _gate = self.write_gate.lock();
        self.backend
            .put(R::KIND.table_name(), record.id().as_str(), value)?;
        Ok(())
    }

    /// Inserts or replaces several records in one atomic write.
    pub fn bulk_put<R: Entity>(&self, records: &[R]) -> EngineResult<BulkPutOutcome> {
        let documents = encode_all(records)?;
        let _gate = self.write_gate.lock();
        let saved_count = self.backend.put_batch(R::KIND.table_name(), documents)?;
        Ok(BulkPutOutcome { saved_count })
    }

    /// Applies `edit` to a live record and writes it back.
    ///
    /// Returns [`EngineError::NotFound`] if the record is missing or already
    /// deleted.
    pub fn update_with<R: Entity>(
        &self,
        id: &RecordId,
        edit: impl FnOnce(&mut R),
    ) -> EngineResult<R> {
        let _gate = self.write_gate.lock();
        let mut record = match self.get::<R>(id)? {
            Some(record) if !record.is_deleted() => record,
            _ => {
                return Err(EngineError::NotFound {
                    kind: R::KIND,
                    id: id.clone(),
                })
            }
        };
        edit(&mut record);
        self.backend
            .put(R::KIND.table_name(), id.as_str(), encode(&record)?)?;
        Ok(record)
    }

    /// Writes incoming records, merging each with the stored copy first.
    ///
    /// Incoming data may have been computed from an older read of this store.
    /// Resolving against what is stored now keeps tombstones sticky, keeps
    /// local binary fields, and stops a stale copy from overwriting a newer
    /// local edit. Records equal to their stored copy are not rewritten.
    ///
    /// Returns the number of records written.
    pub fn merge_in<R: Entity>(&self, incoming: &[R], now: Timestamp) -> EngineResult<usize> {
        if incoming.is_empty() {
            return Ok(0);
        }

        let _gate = self.write_gate.lock();
        let mut pending = Vec::with_capacity(incoming.len());
        for record in incoming {
            let merged = match self.get::<R>(record.id())? {
                Some(stored) => {
                    let (merged, _) = resolve_pair(&stored, record, now);
                    if merged == stored {
                        continue;
                    }
                    merged
                }
                None => record.clone(),
            };
            pending.push(merged);
        }

        if pending.is_empty() {
            return Ok(0);
        }
        let documents = encode_all(&pending)?;
        let written = self.backend.put_batch(R::KIND.table_name(), documents)?;
        tracing::debug!(kind = %R::KIND, written, "merged incoming records");
        Ok(written)
    }
}

fn encode<R: Entity>(record: &R) -> EngineResult<serde_json::Value> {
    serde_json::to_value(record).map_err(|source| EngineError::Encoding {
        kind: R::KIND,
        id: record.id().clone(),
        source,
    })
}

fn encode_all<R: Entity>(records: &[R]) -> EngineResult<Vec<Document>> {
    records
        .iter()
        .map(|record| Ok((record.id().as_str().to_owned(), encode(record)?)))
        .collect()
}

fn decode<R: Entity>(id: &RecordId, value: serde_json::Value) -> EngineResult<R> {
    serde_json::from_value(value).map_err(|source| EngineError::Encoding {
        kind: R::KIND,
        id: id.clone(),
        source,
    })
}
