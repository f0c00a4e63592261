//! The cloud document store.

use crate::config::CloudConfig;
use crate::error::{CloudError, CloudResult};
use crate::subscribers::Registry;
use meetsync_model::{
    Entity, EntityKind, RecordId, RemoteError, RemoteResult, RemoteStore, Subscription,
};
use meetsync_storage::{Document, InMemoryTableStore, TableStore};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A cloud document store holding one collection per entity kind.
///
/// Documents are kept in a [`TableStore`], in memory by default. Binary
/// fields are stripped on every save. Every change is pushed to the
/// subscribers of its kind as the complete current set.
///
/// The store can be switched offline, made to reject credentials, or told
/// to fail saves of particular records, so callers can exercise their
/// failure handling.
///
/// # Example
///
/// ```rust
/// use meetsync_cloud::CloudStore;
/// use meetsync_model::{Category, RemoteStore};
///
/// let cloud = CloudStore::in_memory();
/// let subscription = cloud.subscribe::<Category>().unwrap();
/// assert_eq!(subscription.recv(), Some(Vec::new()));
/// ```
#[derive(Debug)]
pub struct CloudStore<B: TableStore = InMemoryTableStore> {
    tables: B,
    config: CloudConfig,
    online: AtomicBool,
    credentials_valid: AtomicBool,
    writes: AtomicU64,
    failing: Mutex<HashMap<(EntityKind, RecordId), RemoteError>>,
    subscribers: Arc<Registry>,
}

impl CloudStore<InMemoryTableStore> {
    /// Creates an empty in-memory store.
    pub fn in_memory() -> Self {
        Self::new(InMemoryTableStore::new(), CloudConfig::default())
    }
}

impl<B: TableStore> CloudStore<B> {
    /// Creates a store over `tables`.
    pub fn new(tables: B, config: CloudConfig) -> Self {
        Self {
            tables,
            config,
            online: AtomicBool::new(true),
            credentials_valid: AtomicBool::new(true),
            writes: AtomicU64::new(0),
            failing: Mutex::new(HashMap::new()),
            subscribers: Arc::new(Registry::default()),
        }
    }

    /// The backing tables.
    pub fn tables(&self) -> &B {
        &self.tables
    }

    /// Takes the store online or offline.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        tracing::debug!(online, "cloud connectivity changed");
    }

    /// Makes every call fail authorization, or stops doing so.
    pub fn set_permission_denied(&self, denied: bool) {
        self.credentials_valid.store(!denied, Ordering::SeqCst);
    }

    /// Makes saves of one record fail with `error` until cleared.
    pub fn fail_saves_of(&self, kind: EntityKind, id: &RecordId, error: RemoteError) {
        self.failing.lock().insert((kind, id.clone()), error);
    }

    /// Clears every injected failure and brings the store back online.
    pub fn clear_failures(&self) {
        self.failing.lock().clear();
        self.set_online(true);
        self.set_permission_denied(false);
    }

    /// Writes accepted so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Live subscribers of `kind`.
    pub fn subscriber_count(&self, kind: EntityKind) -> usize {
        self.subscribers.count(kind)
    }

    /// The stored JSON document, bypassing decoding and failure injection.
    pub fn raw_document(&self, kind: EntityKind, id: &RecordId) -> CloudResult<Option<Value>> {
        Ok(self.tables.get(kind.table_name(), id.as_str())?)
    }

    /// Number of stored documents of `kind`, tombstones included.
    pub fn document_count(&self, kind: EntityKind) -> CloudResult<usize> {
        Ok(self.tables.len(kind.table_name())?)
    }

    fn check_reachable(&self) -> CloudResult<()> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(CloudError::Offline);
        }
        if !self.credentials_valid.load(Ordering::SeqCst) {
            return Err(CloudError::PermissionDenied);
        }
        Ok(())
    }

    fn check_write(&self, kind: EntityKind, id: &RecordId) -> CloudResult<()> {
        self.check_reachable()?;
        if let Some(error) = self.failing.lock().get(&(kind, id.clone())) {
            return Err(CloudError::Injected(error.clone()));
        }
        if let Some(quota) = self.config.write_quota {
            if self.writes.load(Ordering::SeqCst) >= quota {
                return Err(CloudError::WriteQuota { quota });
            }
        }
        Ok(())
    }

    fn scan(&self, kind: EntityKind) -> Vec<Document> {
        match self.tables.scan(kind.table_name()) {
            Ok(documents) => documents,
            Err(e) => {
                tracing::error!(%kind, error = %e, "cannot read collection for delivery");
                Vec::new()
            }
        }
    }

    fn notify(&self, kind: EntityKind) {
        self.subscribers.broadcast(kind, || self.scan(kind));
    }

    fn decode<R: Entity>(id: &str, value: Value) -> CloudResult<R> {
        serde_json::from_value(value).map_err(|source| CloudError::Malformed {
            kind: R::KIND,
            id: id.to_owned(),
            source,
        })
    }

    fn save_document<R: Entity>(&self, record: &R) -> CloudResult<()> {
        self.check_write(R::KIND, record.id())?;

        let stripped = record.without_binary();
        let encoded = serde_json::to_vec(&stripped).map_err(|source| CloudError::Malformed {
            kind: R::KIND,
            id: record.id().to_string(),
            source,
        })?;
        if encoded.len() > self.config.max_document_bytes {
            return Err(CloudError::DocumentTooLarge {
                kind: R::KIND,
                id: record.id().to_string(),
                size: encoded.len(),
                limit: self.config.max_document_bytes,
            });
        }
        let value: Value =
            serde_json::from_slice(&encoded).map_err(|source| CloudError::Malformed {
                kind: R::KIND,
                id: record.id().to_string(),
                source,
            })?;

        self.tables
            .put(R::KIND.table_name(), record.id().as_str(), value)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(kind = %R::KIND, id = %record.id(), deleted = record.is_deleted(), "document saved");
        Ok(())
    }
}

impl<B: TableStore> RemoteStore for CloudStore<B> {
    fn is_available(&self) -> bool {
        self.check_reachable().is_ok()
    }

    fn get<R: Entity>(&self, id: &RecordId) -> RemoteResult<Option<R>> {
        self.check_reachable()?;
        match self
            .tables
            .get(R::KIND.table_name(), id.as_str())
            .map_err(CloudError::from)?
        {
            Some(value) => Ok(Some(Self::decode(id.as_str(), value)?)),
            None => Ok(None),
        }
    }

    fn get_all<R: Entity>(&self) -> RemoteResult<Vec<R>> {
        self.check_reachable()?;
        let documents = self
            .tables
            .scan(R::KIND.table_name())
            .map_err(CloudError::from)?;
        let records = documents
            .into_iter()
            .map(|(id, value)| Self::decode(&id, value))
            .collect::<CloudResult<Vec<R>>>()?;
        Ok(records)
    }

    fn save<R: Entity>(&self, record: &R) -> RemoteResult<()> {
        self.save_document(record)?;
        self.notify(R::KIND);
        Ok(())
    }

    fn delete(&self, kind: EntityKind, id: &RecordId) -> RemoteResult<bool> {
        self.check_write(kind, id)?;
        let removed = self
            .tables
            .remove(kind.table_name(), id.as_str())
            .map_err(CloudError::from)?;
        if removed {
            self.writes.fetch_add(1, Ordering::SeqCst);
            tracing::info!(%kind, %id, "document removed");
            self.notify(kind);
        }
        Ok(removed)
    }

    fn subscribe<R: Entity>(&self) -> RemoteResult<Subscription<R>> {
        self.check_reachable()?;
        Ok(self.subscribers.subscribe::<R>(|| self.scan(R::KIND)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meetsync_model::{
        Blob, Category, CategoryFields, Meeting, MeetingFields, RecordMeta, Timestamp,
    };
    use std::time::Duration;

    fn category(id: &str, label: &str) -> Category {
        Category::new(
            RecordMeta::created(id.into(), Timestamp::from_millis(10)),
            CategoryFields {
                key: id.to_owned(),
                label: label.to_owned(),
                ..CategoryFields::default()
            },
        )
    }

    #[test]
    fn save_and_get() {
        let cloud = CloudStore::in_memory();
        cloud.save(&category("c1", "Sales")).unwrap();

        let fetched: Option<Category> = cloud.get(&"c1".into()).unwrap();
        assert_eq!(fetched, Some(category("c1", "Sales")));
        assert_eq!(cloud.get_all::<Category>().unwrap().len(), 1);
        assert!(cloud.get_all::<Meeting>().unwrap().is_empty());
        assert_eq!(cloud.write_count(), 1);
    }

    #[test]
    fn binary_fields_are_stripped() {
        let cloud = CloudStore::in_memory();
        let meeting = Meeting::new(
            RecordMeta::created("m1".into(), Timestamp::from_millis(1)),
            MeetingFields {
                title: "retro".into(),
                audio: Some(Blob::new("audio/webm", vec![0; 64])),
                images: vec![Blob::new("image/png", vec![1; 8])],
                ..MeetingFields::default()
            },
        );
        cloud.save(&meeting).unwrap();

        let raw = cloud
            .raw_document(EntityKind::Meeting, &"m1".into())
            .unwrap()
            .unwrap();
        assert!(raw.get("audio").is_none());
        assert!(raw.get("images").is_none());
        let fetched: Meeting = cloud.get(&"m1".into()).unwrap().unwrap();
        assert!(!fetched.has_binary());
        assert_eq!(fetched.fields().title, "retro");
    }

    #[test]
    fn offline_and_denied() {
        let cloud = CloudStore::in_memory();
        cloud.set_online(false);
        assert!(!cloud.is_available());
        let err = cloud.save(&category("c1", "x")).unwrap_err();
        assert!(matches!(err, RemoteError::Network(_)));

        cloud.set_online(true);
        cloud.set_permission_denied(true);
        let err = cloud.get_all::<Category>().unwrap_err();
        assert!(matches!(err, RemoteError::PermissionDenied(_)));

        cloud.clear_failures();
        assert!(cloud.is_available());
    }

    #[test]
    fn injected_save_failure_is_per_record() {
        let cloud = CloudStore::in_memory();
        cloud.fail_saves_of(
            EntityKind::Category,
            &"bad".into(),
            RemoteError::QuotaExceeded("injected".into()),
        );

        assert!(cloud.save(&category("good", "ok")).is_ok());
        assert_eq!(
            cloud.save(&category("bad", "no")).unwrap_err(),
            RemoteError::QuotaExceeded("injected".into())
        );
        assert_eq!(cloud.document_count(EntityKind::Category).unwrap(), 1);
    }

    #[test]
    fn write_quota_and_size_limit() {
        let cloud = CloudStore::new(
            InMemoryTableStore::new(),
            CloudConfig::new().with_write_quota(1).with_max_document_bytes(4096),
        );
        cloud.save(&category("a", "A")).unwrap();
        let err = cloud.save(&category("b", "B")).unwrap_err();
        assert!(matches!(err, RemoteError::QuotaExceeded(_)));

        let cloud = CloudStore::new(
            InMemoryTableStore::new(),
            CloudConfig::new().with_max_document_bytes(16),
        );
        let err = cloud.save(&category("a", "A")).unwrap_err();
        assert!(matches!(err, RemoteError::QuotaExceeded(_)));
    }

    #[test]
    fn subscription_gets_current_set_then_changes() {
        let cloud = CloudStore::in_memory();
        cloud.save(&category("a", "A")).unwrap();

        let subscription = cloud.subscribe::<Category>().unwrap();
        let first = subscription.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.len(), 1);

        cloud.save(&category("b", "B")).unwrap();
        let second = subscription.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(second.len(), 2);

        // Other kinds do not notify this subscriber.
        cloud
            .save(&Meeting::new(
                RecordMeta::created("m".into(), Timestamp::from_millis(1)),
                MeetingFields::default(),
            ))
            .unwrap();
        assert!(subscription.recv_timeout(Duration::from_millis(20)).is_none());

        assert!(cloud.delete(EntityKind::Category, &"a".into()).unwrap());
        let third = subscription.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(third.len(), 1);
        assert!(!cloud.delete(EntityKind::Category, &"a".into()).unwrap());
    }

    #[test]
    fn unsubscribe_closes_channel() {
        let cloud = CloudStore::in_memory();
        let subscription = cloud.subscribe::<Category>().unwrap();
        assert_eq!(cloud.subscriber_count(EntityKind::Category), 1);

        let (deliveries, unsubscribe) = subscription.into_parts();
        assert_eq!(deliveries.recv().unwrap(), Vec::<Category>::new());
        drop(unsubscribe);

        assert_eq!(cloud.subscriber_count(EntityKind::Category), 0);
        assert!(deliveries.recv().is_err());
    }

    #[test]
    fn dropped_receivers_are_pruned_on_next_change() {
        let cloud = CloudStore::in_memory();
        let (deliveries, unsubscribe) = cloud.subscribe::<Category>().unwrap().into_parts();
        drop(deliveries);
        assert_eq!(cloud.subscriber_count(EntityKind::Category), 1);

        cloud.save(&category("a", "A")).unwrap();
        assert_eq!(cloud.subscriber_count(EntityKind::Category), 0);
        drop(unsubscribe);
    }

    #[test]
    fn subscribe_requires_reachable_store() {
        let cloud = CloudStore::in_memory();
        cloud.set_online(false);
        assert!(cloud.subscribe::<Category>().is_err());
    }
}
