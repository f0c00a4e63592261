//! Full bidirectional sync.
//!
//! A pass fetches both replicas of every kind, reconciles them, uploads
//! what the remote replica is missing, persists the merged sets locally and
//! reloads the read model. Only one pass runs at a time; the sync lock is
//! held for the whole pass and released on every exit path.

use crate::engine::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::read_model::Published;
use crate::state::{RecordCounts, SyncReport, SyncState, UploadFailure};
use meetsync_model::{
    reconcile, Category, Entity, Meeting, ReconcileOptions, Reconciliation, RemoteError,
    RemoteStore, Stakeholder, Timestamp,
};
use meetsync_storage::TableStore;
use std::sync::Arc;
use std::time::Instant;

/// Runs full sync passes.
pub struct SyncOrchestrator<B: TableStore, S: RemoteStore> {
    ctx: Arc<EngineContext<B, S>>,
}

impl<B: TableStore, S: RemoteStore> Clone for SyncOrchestrator<B, S> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

/// One kind's reconciliation, waiting to be applied.
struct Plan<R> {
    reconciliation: Reconciliation<R>,
}

impl<B: TableStore, S: RemoteStore> SyncOrchestrator<B, S> {
    pub(crate) fn new(ctx: Arc<EngineContext<B, S>>) -> Self {
        Self { ctx }
    }

    /// Runs one full sync pass.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Remote`] with [`RemoteError::Unavailable`] if the
    ///   remote replica is not configured or unreachable
    /// - [`EngineError::SyncInProgress`] if another pass holds the sync lock
    /// - [`EngineError::Remote`] if fetching a remote set fails
    /// - [`EngineError::MergeInvariant`] if a merge lost records; nothing is
    ///   persisted in that case
    /// - Local store errors
    ///
    /// Individual upload failures do not fail the pass; they are listed in
    /// [`SyncReport::failed_uploads`].
    pub fn full_sync(&self) -> EngineResult<SyncReport> {
        let started = Instant::now();

        if !self.ctx.remote_ready() {
            let err = EngineError::Remote(RemoteError::Unavailable(
                "remote store is not configured or not reachable".into(),
            ));
            self.ctx.stats.write().last_error = Some(err.to_string());
            return Err(err);
        }

        let Some(_guard) = self.ctx.locks.sync().guard() else {
            tracing::debug!("sync pass already running");
            self.ctx.stats.write().busy_rejections += 1;
            return Err(EngineError::SyncInProgress);
        };

        let result = self.run_pass(started);
        match &result {
            Ok(report) => {
                self.ctx.set_state(SyncState::Synced);
                let mut stats = self.ctx.stats.write();
                stats.passes_completed += 1;
                stats.records_uploaded += report.uploaded as u64;
                stats.records_downloaded += report.downloaded as u64;
                stats.failed_uploads += report.failed_uploads.len() as u64;
                stats.last_sync_time = Some(self.ctx.clock.now());
                stats.last_error = None;
                tracing::info!(
                    uploaded = report.uploaded,
                    downloaded = report.downloaded,
                    failed_uploads = report.failed_uploads.len(),
                    duration_ms = report.duration.as_millis() as u64,
                    "sync pass complete"
                );
            }
            Err(e) => {
                self.ctx.set_state(SyncState::Error);
                self.ctx.stats.write().last_error = Some(e.to_string());
                if e.is_local() {
                    tracing::error!(error = %e, "sync pass failed in local store");
                } else {
                    tracing::warn!(error = %e, "sync pass failed");
                }
            }
        }
        result
    }

    fn run_pass(&self, started: Instant) -> EngineResult<SyncReport> {
        let now = self.ctx.clock.now();

        self.ctx.set_state(SyncState::Fetching);
        let meetings = self.plan::<Meeting>(now)?;
        let stakeholders = self.plan::<Stakeholder>(now)?;
        let categories = self.plan::<Category>(now)?;

        let mut report = SyncReport::new();

        self.ctx.set_state(SyncState::Uploading);
        self.upload(&meetings, &mut report);
        self.upload(&stakeholders, &mut report);
        self.upload(&categories, &mut report);

        self.ctx.set_state(SyncState::Persisting);
        self.persist(&meetings, &mut report, now)?;
        self.persist(&stakeholders, &mut report, now)?;
        self.persist(&categories, &mut report, now)?;

        self.ctx.reload_read_model()?;

        report.success = true;
        report.duration = started.elapsed();
        Ok(report)
    }

    /// Fetches both replicas of one kind in parallel and reconciles them.
    fn plan<R: Published>(&self, now: Timestamp) -> EngineResult<Plan<R>> {
        let local_store = &self.ctx.local;
        let remote_store = &*self.ctx.remote;

        let (local, remote) = std::thread::scope(|scope| {
            let remote = scope.spawn(|| remote_store.get_all::<R>());
            let local = local_store.get_all::<R>();
            let remote = remote.join().unwrap_or_else(|_| {
                Err(RemoteError::Unavailable("remote fetch panicked".into()))
            });
            (local, remote)
        });
        let local = local?;
        let remote = remote?;

        let options = ReconcileOptions::at(now).with_grace_window(self.ctx.config.grace_window);
        let reconciliation = reconcile(&local, &remote, options);

        if !reconciliation.preserves_size(local.len(), remote.len()) {
            tracing::error!(
                kind = %R::KIND,
                merged = reconciliation.merged.len(),
                local = local.len(),
                remote = remote.len(),
                "merge lost records, aborting pass"
            );
            return Err(EngineError::MergeInvariant {
                kind: R::KIND,
                merged: reconciliation.merged.len(),
                local: local.len(),
                remote: remote.len(),
            });
        }

        tracing::debug!(
            kind = %R::KIND,
            local = local.len(),
            remote = remote.len(),
            to_upload = reconciliation.to_upload.len(),
            to_download = reconciliation.to_download.len(),
            "reconciled"
        );
        Ok(Plan { reconciliation })
    }

    /// Uploads every record the remote replica is missing, one at a time.
    fn upload<R: Entity>(&self, plan: &Plan<R>, report: &mut SyncReport) {
        for record in &plan.reconciliation.to_upload {
            match self.ctx.remote.save(&record.without_binary()) {
                Ok(()) => report.uploaded += 1,
                Err(error) => {
                    tracing::warn!(kind = %R::KIND, id = %record.id(), error = %error, "upload failed");
                    report.failed_uploads.push(UploadFailure {
                        kind: R::KIND,
                        id: record.id().clone(),
                        error,
                    });
                }
            }
        }
    }

    fn persist<R: Entity>(
        &self,
        plan: &Plan<R>,
        report: &mut SyncReport,
        now: Timestamp,
    ) -> EngineResult<()> {
        let reconciliation = &plan.reconciliation;
        self.ctx.local.merge_in(&reconciliation.merged, now)?;

        report.downloaded += reconciliation.to_download.len();
        let live = reconciliation.live_count();
        report.record_counts.insert(
            R::KIND,
            RecordCounts {
                total: reconciliation.merged.len(),
                live,
                tombstones: reconciliation.merged.len() - live,
            },
        );
        Ok(())
    }
}
