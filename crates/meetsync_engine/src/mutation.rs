//! User-initiated writes.
//!
//! Every mutation writes the local store first, then updates the read model,
//! then makes one best-effort attempt to write the remote replica. A local
//! failure is returned as an error; a remote failure is logged and reported
//! on the receipt, and the next full sync retries it.

use crate::engine::EngineContext;
use crate::error::EngineResult;
use crate::read_model::Published;
use meetsync_model::{Entity, RecordId, RecordMeta, RemoteError, RemoteStore};
use meetsync_storage::TableStore;
use std::sync::Arc;

/// Outcome of a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationReceipt<R> {
    /// The record as written to the local store.
    pub record: R,
    /// Why the remote write did not happen, if it did not.
    pub remote_error: Option<RemoteError>,
}

impl<R> MutationReceipt<R> {
    /// Returns true if the remote replica accepted the write.
    pub fn is_synced(&self) -> bool {
        self.remote_error.is_none()
    }
}

/// Add, update and soft-delete for every kind.
pub struct Mutations<B: TableStore, S: RemoteStore> {
    ctx: Arc<EngineContext<B, S>>,
}

impl<B: TableStore, S: RemoteStore> Clone for Mutations<B, S> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<B: TableStore, S: RemoteStore> Mutations<B, S> {
    pub(crate) fn new(ctx: Arc<EngineContext<B, S>>) -> Self {
        Self { ctx }
    }

    /// Creates a record with a fresh id.
    pub fn add<R: Published>(&self, fields: R::Fields) -> EngineResult<MutationReceipt<R>> {
        let now = self.ctx.clock.now();
        let record = R::from_parts(RecordMeta::created(RecordId::generate(), now), fields);

        self.ctx.local.put(&record)?;
        self.ctx.read_model.upsert(record.clone());
        tracing::debug!(kind = %R::KIND, id = %record.id(), "record added");

        let remote_error = self.push(&record);
        Ok(MutationReceipt {
            record,
            remote_error,
        })
    }

    /// Edits the payload of a live record.
    ///
    /// `updated_at` moves to the current time but never backwards.
    pub fn update<R: Published>(
        &self,
        id: &RecordId,
        edit: impl FnOnce(&mut R::Fields),
    ) -> EngineResult<MutationReceipt<R>> {
        let now = self.ctx.clock.now();
        let record = self.ctx.local.update_with::<R>(id, |record| {
            edit(record.fields_mut());
            record.meta_mut().touch(now);
        })?;
        self.ctx.read_model.upsert(record.clone());
        tracing::debug!(kind = %R::KIND, %id, "record updated");

        let remote_error = self.push(&record);
        Ok(MutationReceipt {
            record,
            remote_error,
        })
    }

    /// Marks a record deleted.
    ///
    /// Holds the interaction lock while the delete settles so that a push
    /// delivery computed before the delete cannot bring the record back on
    /// screen. The deletion is propagated as a flag through a normal save;
    /// the remote document is never removed.
    pub fn soft_delete<R: Published>(&self, id: &RecordId) -> EngineResult<MutationReceipt<R>> {
        let token = self.ctx.locks.begin_interaction();
        if token.is_none() {
            tracing::debug!(kind = %R::KIND, %id, "interaction already in progress");
        }

        let hidden = self.ctx.read_model.remove::<R>(id);
        let now = self.ctx.clock.now();
        let record = match self
            .ctx
            .local
            .update_with::<R>(id, |record| record.meta_mut().mark_deleted(now))
        {
            Ok(record) => record,
            Err(e) => {
                if let Some(record) = hidden {
                    self.ctx.read_model.upsert(record);
                }
                if let Some(token) = token {
                    self.ctx.locks.interaction().release_token(token);
                }
                return Err(e);
            }
        };
        tracing::debug!(kind = %R::KIND, %id, "record deleted");

        let remote_error = self.push(&record);
        if let Some(token) = token {
            self.ctx.locks.end_interaction(token);
        }
        Ok(MutationReceipt {
            record,
            remote_error,
        })
    }

    /// One best-effort remote write, binary fields stripped.
    fn push<R: Entity>(&self, record: &R) -> Option<RemoteError> {
        if !self.ctx.remote_ready() {
            tracing::debug!(kind = %R::KIND, id = %record.id(), "remote not ready, write left for next sync");
            return Some(RemoteError::Unavailable(
                "remote store is not configured or not reachable".into(),
            ));
        }
        match self.ctx.remote.save(&record.without_binary()) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(kind = %R::KIND, id = %record.id(), error = %e, "remote write failed");
                Some(e)
            }
        }
    }
}
