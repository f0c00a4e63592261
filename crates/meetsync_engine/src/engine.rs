//! Engine facade and background scheduling.

use crate::config::SyncConfig;
use crate::error::{EngineError, EngineResult};
use crate::local::RecordStore;
use crate::lock::LockManager;
use crate::mutation::Mutations;
use crate::orchestrator::SyncOrchestrator;
use crate::read_model::{Published, ReadModel};
use crate::state::{RecordCounts, SyncReport, SyncState, SyncStats};
use crate::subscription::{SubscriptionHandler, SubscriptionSet};
use meetsync_model::{
    Category, Entity, EntityKind, Meeting, RemoteStore, SharedClock, Stakeholder, SystemClock,
};
use meetsync_storage::TableStore;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// State shared by the orchestrator, the subscription handler and the
/// mutation API.
pub(crate) struct EngineContext<B: TableStore, S: RemoteStore> {
    pub(crate) config: SyncConfig,
    pub(crate) clock: SharedClock,
    pub(crate) local: RecordStore<B>,
    pub(crate) remote: Arc<S>,
    pub(crate) read_model: Arc<ReadModel>,
    pub(crate) locks: Arc<LockManager>,
    pub(crate) stats: RwLock<SyncStats>,
    pub(crate) state: RwLock<SyncState>,
    /// Kinds whose stored records changed while the read model was frozen.
    pub(crate) deferred: Mutex<BTreeSet<EntityKind>>,
}

impl<B: TableStore, S: RemoteStore> EngineContext<B, S> {
    /// Returns true if the remote replica is configured and reachable.
    pub(crate) fn remote_ready(&self) -> bool {
        self.config.remote_enabled && self.remote.is_available()
    }

    pub(crate) fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Republishes every kind from the local store.
    ///
    /// Kinds are skipped while a delete settles and republished once the
    /// interaction lock clears.
    pub(crate) fn reload_read_model(&self) -> EngineResult<()> {
        self.reload::<Meeting>()?;
        self.reload::<Stakeholder>()?;
        self.reload::<Category>()?;
        Ok(())
    }

    /// Republishes one kind from the local store. Returns false if the
    /// interaction lock was held and the kind was deferred instead.
    fn reload<R: Published>(&self) -> EngineResult<bool> {
        let published = self.read_model.refresh::<R, EngineError>(|_| {
            if self.locks.interaction().is_held() {
                self.deferred.lock().insert(R::KIND);
                return Ok(None);
            }
            Ok(Some(self.local.get_all::<R>()?))
        })?;
        Ok(published.is_some())
    }

    /// Republishes the kinds deferred while a lock was held.
    ///
    /// Does nothing while either lock is held; the release of that lock
    /// flushes again.
    pub(crate) fn flush_deferred(&self) {
        if self.locks.any_held() {
            return;
        }
        let kinds = std::mem::take(&mut *self.deferred.lock());
        for kind in kinds {
            let result = match kind {
                EntityKind::Meeting => self.reload::<Meeting>(),
                EntityKind::Stakeholder => self.reload::<Stakeholder>(),
                EntityKind::Category => self.reload::<Category>(),
            };
            match result {
                Ok(true) => tracing::debug!(%kind, "deferred changes published"),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(%kind, error = %e, "failed to publish deferred changes");
                    self.deferred.lock().insert(kind);
                }
            }
        }
    }

    fn counts<R: Entity>(&self) -> EngineResult<RecordCounts> {
        let records = self.local.get_all::<R>()?;
        let tombstones = records.iter().filter(|r| r.is_deleted()).count();
        Ok(RecordCounts {
            total: records.len(),
            live: records.len() - tombstones,
            tombstones,
        })
    }
}

/// Builder for [`SyncEngine`].
pub struct EngineBuilder<B: TableStore, S: RemoteStore> {
    config: SyncConfig,
    local: B,
    remote: Arc<S>,
    clock: Option<SharedClock>,
    locks: Option<Arc<LockManager>>,
    read_model: Option<Arc<ReadModel>>,
}

impl<B: TableStore, S: RemoteStore> EngineBuilder<B, S> {
    /// Uses `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Shares an existing lock manager.
    pub fn with_locks(mut self, locks: Arc<LockManager>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Shares an existing read model.
    pub fn with_read_model(mut self, read_model: Arc<ReadModel>) -> Self {
        self.read_model = Some(read_model);
        self
    }
}

impl<B: TableStore + 'static, S: RemoteStore + 'static> EngineBuilder<B, S> {
    /// Builds the engine. The read model starts empty; call
    /// [`SyncEngine::load`] to fill it from the local store.
    pub fn build(self) -> SyncEngine<B, S> {
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let locks = self
            .locks
            .unwrap_or_else(|| Arc::new(LockManager::new(&self.config, Arc::clone(&clock))));
        let ctx = Arc::new(EngineContext {
            config: self.config,
            clock,
            local: RecordStore::new(self.local),
            remote: self.remote,
            read_model: self.read_model.unwrap_or_default(),
            locks,
            stats: RwLock::new(SyncStats::default()),
            state: RwLock::new(SyncState::Idle),
            deferred: Mutex::new(BTreeSet::new()),
        });

        for lock in [ctx.locks.sync(), ctx.locks.interaction()] {
            let weak = Arc::downgrade(&ctx);
            lock.on_release(move || {
                if let Some(ctx) = weak.upgrade() {
                    ctx.flush_deferred();
                }
            });
        }

        SyncEngine {
            orchestrator: SyncOrchestrator::new(Arc::clone(&ctx)),
            mutations: Mutations::new(Arc::clone(&ctx)),
            subscriptions: SubscriptionHandler::new(Arc::clone(&ctx)),
            ctx,
        }
    }
}

/// The sync engine.
///
/// Owns the local record store and a handle to the remote replica, and
/// wires the orchestrator, the subscription handler and the mutation API to
/// one shared read model and lock manager.
///
/// # Example
///
/// ```rust,ignore
/// let engine = SyncEngine::new(SyncConfig::default(), InMemoryTableStore::new(), cloud);
/// engine.load()?;
/// let receipt = engine.mutations().add::<Category>(fields)?;
/// let report = engine.full_sync()?;
/// ```
pub struct SyncEngine<B: TableStore, S: RemoteStore> {
    ctx: Arc<EngineContext<B, S>>,
    orchestrator: SyncOrchestrator<B, S>,
    mutations: Mutations<B, S>,
    subscriptions: SubscriptionHandler<B, S>,
}

impl<B: TableStore, S: RemoteStore> SyncEngine<B, S> {
    /// Starts building an engine.
    pub fn builder(config: SyncConfig, local: B, remote: Arc<S>) -> EngineBuilder<B, S> {
        EngineBuilder {
            config,
            local,
            remote,
            clock: None,
            locks: None,
            read_model: None,
        }
    }

    /// Fills the read model from the local store.
    pub fn load(&self) -> EngineResult<()> {
        self.ctx.reload_read_model()?;
        tracing::debug!("read model loaded from local store");
        Ok(())
    }

    /// Runs one full sync pass. See [`SyncOrchestrator::full_sync`].
    pub fn full_sync(&self) -> EngineResult<SyncReport> {
        self.orchestrator.full_sync()
    }

    /// The sync orchestrator.
    pub fn orchestrator(&self) -> &SyncOrchestrator<B, S> {
        &self.orchestrator
    }

    /// The mutation API.
    pub fn mutations(&self) -> &Mutations<B, S> {
        &self.mutations
    }

    /// The push delivery handler.
    pub fn subscription_handler(&self) -> &SubscriptionHandler<B, S> {
        &self.subscriptions
    }

    /// The UI-visible state.
    pub fn read_model(&self) -> &Arc<ReadModel> {
        &self.ctx.read_model
    }

    /// Published records of one kind.
    pub fn records<R: Published>(&self) -> Vec<R> {
        self.ctx.read_model.records()
    }

    /// The lock manager.
    pub fn locks(&self) -> &Arc<LockManager> {
        &self.ctx.locks
    }

    /// The local record store.
    pub fn local(&self) -> &RecordStore<B> {
        &self.ctx.local
    }

    /// The remote replica.
    pub fn remote(&self) -> &Arc<S> {
        &self.ctx.remote
    }

    /// The engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.ctx.config
    }

    /// Returns true if the remote replica is configured and reachable.
    pub fn remote_ready(&self) -> bool {
        self.ctx.remote_ready()
    }

    /// Current orchestrator phase.
    pub fn state(&self) -> SyncState {
        *self.ctx.state.read()
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> SyncStats {
        self.ctx.stats.read().clone()
    }

    /// Stored record counts per kind, tombstones included.
    pub fn local_counts(&self) -> EngineResult<BTreeMap<EntityKind, RecordCounts>> {
        let mut counts = BTreeMap::new();
        counts.insert(EntityKind::Meeting, self.ctx.counts::<Meeting>()?);
        counts.insert(EntityKind::Stakeholder, self.ctx.counts::<Stakeholder>()?);
        counts.insert(EntityKind::Category, self.ctx.counts::<Category>()?);
        Ok(counts)
    }
}

impl<B: TableStore + 'static, S: RemoteStore + 'static> SyncEngine<B, S> {
    /// Creates an engine with the system clock and fresh locks.
    pub fn new(config: SyncConfig, local: B, remote: Arc<S>) -> Self {
        Self::builder(config, local, remote).build()
    }

    /// Subscribes to every kind. Dropping the returned set unsubscribes.
    pub fn start_subscriptions(&self) -> EngineResult<SubscriptionSet> {
        self.subscriptions.start()
    }

    /// Starts the periodic sync thread if an interval is configured.
    pub fn start_periodic_sync(&self) -> EngineResult<Option<PeriodicSync>> {
        match self.ctx.config.sync_interval {
            Some(interval) => PeriodicSync::start(self.orchestrator.clone(), interval).map(Some),
            None => Ok(None),
        }
    }
}

/// Background thread running a full sync every interval.
///
/// Stops when [`PeriodicSync::stop`] is called or the handle is dropped.
pub struct PeriodicSync {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl PeriodicSync {
    /// Starts running `orchestrator` every `interval`.
    pub fn start<B, S>(orchestrator: SyncOrchestrator<B, S>, interval: Duration) -> EngineResult<Self>
    where
        B: TableStore + 'static,
        S: RemoteStore + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let name = "meetsync-periodic-sync".to_owned();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match orchestrator.full_sync() {
                        Ok(_) => {}
                        Err(EngineError::SyncInProgress) => {
                            tracing::debug!("periodic sync skipped, pass already running");
                        }
                        // Already logged by the orchestrator.
                        Err(_) => {}
                    },
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|source| EngineError::Spawn { name, source })?;

        tracing::info!(interval_ms = interval.as_millis() as u64, "periodic sync started");
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
            interval,
        })
    }

    /// The sync interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stops the thread and waits for a running pass to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("periodic sync thread panicked");
            }
        }
    }
}

impl Drop for PeriodicSync {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PeriodicSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicSync")
            .field("interval", &self.interval)
            .field("running", &self.handle.is_some())
            .finish()
    }
}
