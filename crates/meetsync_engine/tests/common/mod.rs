//! Shared harness for engine integration tests.

#![allow(dead_code)]

use meetsync_cloud::CloudStore;
use meetsync_engine::{SyncConfig, SyncEngine};
use meetsync_model::{Clock, Entity, ManualClock, RecordId, RemoteStore, Timestamp};
use meetsync_storage::InMemoryTableStore;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Start time of every harness clock.
pub const START: i64 = 10_000_000;

pub type TestEngine = SyncEngine<InMemoryTableStore, CloudStore>;

pub struct Harness {
    pub engine: TestEngine,
    pub cloud: Arc<CloudStore>,
    pub clock: ManualClock,
}

impl Harness {
    /// An engine over empty stores whose interaction lock releases at once.
    pub fn new() -> Self {
        Self::with_config(SyncConfig::new().with_interaction_release_delay(Duration::ZERO))
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self::with_parts(config, InMemoryTableStore::new(), Arc::new(CloudStore::in_memory()))
    }

    pub fn with_parts(config: SyncConfig, local: InMemoryTableStore, cloud: Arc<CloudStore>) -> Self {
        let clock = ManualClock::new(Timestamp::from_millis(START));
        let engine = SyncEngine::builder(config, local, Arc::clone(&cloud))
            .with_clock(clock.shared())
            .build();
        Self {
            engine,
            cloud,
            clock,
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now().as_millis()
    }

    /// Seeds the local store directly, bypassing the mutation API.
    pub fn seed_local<R: Entity>(&self, records: &[R]) {
        self.engine.local().bulk_put(records).unwrap();
    }

    /// Seeds the cloud directly, as another device would.
    pub fn seed_cloud<R: Entity>(&self, records: &[R]) {
        for record in records {
            self.cloud.save(record).unwrap();
        }
    }

    pub fn stored<R: Entity>(&self, id: &str) -> Option<R> {
        self.engine.local().get::<R>(&RecordId::from(id)).unwrap()
    }

    pub fn in_cloud<R: Entity>(&self, id: &str) -> Option<R> {
        self.cloud.get::<R>(&RecordId::from(id)).unwrap()
    }
}

/// Polls `condition` until it holds or five seconds pass.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
