//! Push delivery handling.
//!
//! Each kind has one remote subscription that delivers the complete remote
//! set after every change. Deliveries always reach the local store. They
//! only reach the read model while no lock is held, so a delete or a sync
//! pass in flight is never visually undone by a delivery computed before it.
//! A kind skipped that way is republished from the local store as soon as
//! the lock clears.

use crate::engine::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::read_model::Published;
use meetsync_model::{
    reconcile, Category, EntityKind, Meeting, ReconcileOptions, RemoteStore, Stakeholder,
    Unsubscribe,
};
use meetsync_storage::TableStore;
use std::sync::Arc;
use std::thread::JoinHandle;

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Persisted only; a lock was held so the read model was left alone.
    Deferred {
        /// Records written to the local store.
        written: usize,
    },
    /// Persisted and published.
    Published {
        /// Records written to the local store.
        written: usize,
        /// Live records published.
        live: usize,
    },
}

impl DeliveryOutcome {
    /// Records written to the local store.
    pub fn written(&self) -> usize {
        match *self {
            DeliveryOutcome::Deferred { written } | DeliveryOutcome::Published { written, .. } => {
                written
            }
        }
    }
}

/// Applies push deliveries.
pub struct SubscriptionHandler<B: TableStore, S: RemoteStore> {
    ctx: Arc<EngineContext<B, S>>,
}

impl<B: TableStore, S: RemoteStore> Clone for SubscriptionHandler<B, S> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<B: TableStore, S: RemoteStore> SubscriptionHandler<B, S> {
    pub(crate) fn new(ctx: Arc<EngineContext<B, S>>) -> Self {
        Self { ctx }
    }

    /// Applies one delivery of the complete remote set of a kind.
    ///
    /// Each delivered record is merged with the stored copy before it is
    /// written, so tombstones stick, local binaries survive and a newer
    /// local edit is not replaced by an older remote copy.
    pub fn on_delivery<R: Published>(&self, delivered: Vec<R>) -> EngineResult<DeliveryOutcome> {
        let now = self.ctx.clock.now();
        let written = self.ctx.local.merge_in(&delivered, now)?;

        let options = ReconcileOptions::at(now).with_grace_window(self.ctx.config.grace_window);
        let published = self.ctx.read_model.refresh::<R, EngineError>(|visible| {
            if self.ctx.locks.any_held() {
                self.ctx.deferred.lock().insert(R::KIND);
                return Ok(None);
            }
            Ok(Some(reconcile(visible, &delivered, options).merged))
        })?;
        let Some(live) = published else {
            tracing::debug!(kind = %R::KIND, written, "lock held, read model left stale");
            return Ok(DeliveryOutcome::Deferred { written });
        };
        self.ctx.flush_deferred();

        tracing::debug!(kind = %R::KIND, written, live, "delivery published");
        Ok(DeliveryOutcome::Published { written, live })
    }
}

impl<B: TableStore + 'static, S: RemoteStore + 'static> SubscriptionHandler<B, S> {
    /// Subscribes to every kind and consumes deliveries on background threads.
    pub fn start(&self) -> EngineResult<SubscriptionSet> {
        let mut set = SubscriptionSet {
            workers: Vec::with_capacity(EntityKind::ALL.len()),
        };
        set.workers.push(self.spawn::<Meeting>()?);
        set.workers.push(self.spawn::<Stakeholder>()?);
        set.workers.push(self.spawn::<Category>()?);
        tracing::info!("push subscriptions started");
        Ok(set)
    }

    fn spawn<R: Published>(&self) -> EngineResult<Worker> {
        let (deliveries, unsubscribe) = self.ctx.remote.subscribe::<R>()?.into_parts();
        let handler = self.clone();
        let name = format!("meetsync-subscription-{}", R::KIND);

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Ok(records) = deliveries.recv() {
                    if let Err(e) = handler.on_delivery(records) {
                        tracing::error!(kind = %R::KIND, error = %e, "failed to apply delivery");
                        handler.ctx.stats.write().last_error = Some(e.to_string());
                    }
                }
                tracing::debug!(kind = %R::KIND, "subscription closed");
            })
            .map_err(|source| EngineError::Spawn { name, source })?;

        Ok(Worker {
            kind: R::KIND,
            unsubscribe,
            handle: Some(handle),
        })
    }
}

struct Worker {
    kind: EntityKind,
    unsubscribe: Unsubscribe,
    handle: Option<JoinHandle<()>>,
}

/// Running subscriptions. Unsubscribes and joins its threads when dropped.
pub struct SubscriptionSet {
    workers: Vec<Worker>,
}

impl SubscriptionSet {
    /// Kinds being watched.
    pub fn kinds(&self) -> Vec<EntityKind> {
        self.workers.iter().map(|w| w.kind).collect()
    }

    /// Unsubscribes and waits for the consumer threads to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        for worker in &mut self.workers {
            worker.unsubscribe.cancel();
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    tracing::error!(kind = %worker.kind, "subscription thread panicked");
                }
            }
        }
        self.workers.clear();
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SubscriptionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionSet")
            .field("kinds", &self.kinds())
            .finish()
    }
}
