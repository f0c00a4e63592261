//! UI-visible record sets.
//!
//! The read model holds the live (non-deleted) records of each kind that the
//! UI renders, and notifies listeners whenever a set changes. It is fed by
//! optimistic mutations, full-sync reloads and push deliveries.
//!
//! Listeners receive events over `mpsc` channels. A listener whose receiver
//! was dropped is removed on the next notification.

use meetsync_model::{Category, Entity, EntityKind, Meeting, RecordId, Stakeholder};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

/// A copy of every published set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Live meetings.
    pub meetings: Vec<Meeting>,
    /// Live stakeholders.
    pub stakeholders: Vec<Stakeholder>,
    /// Live categories.
    pub categories: Vec<Category>,
}

impl Snapshot {
    /// Number of live records of `kind`.
    pub fn live_count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Meeting => self.meetings.len(),
            EntityKind::Stakeholder => self.stakeholders.len(),
            EntityKind::Category => self.categories.len(),
        }
    }
}

/// A record kind with a slot in the [`Snapshot`].
pub trait Published: Entity {
    /// The slot holding this kind.
    fn slot(snapshot: &Snapshot) -> &Vec<Self>;

    /// Mutable access to the slot holding this kind.
    fn slot_mut(snapshot: &mut Snapshot) -> &mut Vec<Self>;
}

impl Published for Meeting {
    fn slot(snapshot: &Snapshot) -> &Vec<Self> {
        &snapshot.meetings
    }

    fn slot_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
        &mut snapshot.meetings
    }
}

impl Published for Stakeholder {
    fn slot(snapshot: &Snapshot) -> &Vec<Self> {
        &snapshot.stakeholders
    }

    fn slot_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
        &mut snapshot.stakeholders
    }
}

impl Published for Category {
    fn slot(snapshot: &Snapshot) -> &Vec<Self> {
        &snapshot.categories
    }

    fn slot_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
        &mut snapshot.categories
    }
}

/// Emitted after a published set changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadModelEvent {
    /// Kind whose set changed.
    pub kind: EntityKind,
    /// Live records of that kind after the change.
    pub live_count: usize,
}

/// The UI-visible state.
#[derive(Debug, Default)]
pub struct ReadModel {
    snapshot: RwLock<Snapshot>,
    listeners: Mutex<Vec<Sender<ReadModelEvent>>>,
    version: AtomicU64,
}

impl ReadModel {
    /// Creates an empty read model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Published records of a kind.
    pub fn records<R: Published>(&self) -> Vec<R> {
        R::slot(&self.snapshot.read()).clone()
    }

    /// One published record.
    pub fn get<R: Published>(&self, id: &RecordId) -> Option<R> {
        R::slot(&self.snapshot.read())
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    /// Replaces the published set of a kind. Tombstones are filtered out.
    pub fn publish<R: Published>(&self, records: impl IntoIterator<Item = R>) {
        let live: Vec<R> = records.into_iter().filter(|r| !r.is_deleted()).collect();
        let count = live.len();
        *R::slot_mut(&mut self.snapshot.write()) = live;
        self.changed(R::KIND, count);
    }

    /// Recomputes the published set of a kind from its current contents.
    ///
    /// `refresh` runs while the set is write-locked, so no upsert or remove
    /// can land between reading the set and replacing it. Returning
    /// `Ok(None)` leaves the set untouched. Yields the live count after a
    /// replacement.
    pub fn refresh<R, E>(
        &self,
        refresh: impl FnOnce(&[R]) -> Result<Option<Vec<R>>, E>,
    ) -> Result<Option<usize>, E>
    where
        R: Published,
    {
        let count = {
            let mut snapshot = self.snapshot.write();
            let Some(records) = refresh(R::slot(&snapshot))? else {
                return Ok(None);
            };
            let slot = R::slot_mut(&mut snapshot);
            *slot = records.into_iter().filter(|r| !r.is_deleted()).collect();
            slot.len()
        };
        self.changed(R::KIND, count);
        Ok(Some(count))
    }

    /// Inserts or replaces one record. A tombstone removes it instead.
    pub fn upsert<R: Published>(&self, record: R) {
        let count = {
            let mut snapshot = self.snapshot.write();
            let slot = R::slot_mut(&mut snapshot);
            let position = slot.iter().position(|r| r.id() == record.id());
            match (position, record.is_deleted()) {
                (Some(i), false) => slot[i] = record,
                (Some(i), true) => {
                    slot.remove(i);
                }
                (None, false) => slot.push(record),
                (None, true) => {}
            }
            slot.len()
        };
        self.changed(R::KIND, count);
    }

    /// Removes one record, returning it if it was published.
    pub fn remove<R: Published>(&self, id: &RecordId) -> Option<R> {
        let (removed, count) = {
            let mut snapshot = self.snapshot.write();
            let slot = R::slot_mut(&mut snapshot);
            let removed = slot
                .iter()
                .position(|r| r.id() == id)
                .map(|i| slot.remove(i));
            (removed, slot.len())
        };
        if removed.is_some() {
            self.changed(R::KIND, count);
        }
        removed
    }

    /// A copy of every published set.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.read().clone()
    }

    /// Number of changes published so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Subscribes to change events.
    pub fn subscribe(&self) -> Receiver<ReadModelEvent> {
        let (tx, rx) = mpsc::channel();
        self.listeners.lock().push(tx);
        rx
    }

    fn changed(&self, kind: EntityKind, live_count: usize) {
        self.version.fetch_add(1, Ordering::SeqCst);
        let event = ReadModelEvent { kind, live_count };
        self.listeners
            .lock()
            .retain(|listener| listener.send(event).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meetsync_model::{CategoryFields, RecordMeta, Timestamp};

    fn category(id: &str) -> Category {
        Category::new(
            RecordMeta::created(id.into(), Timestamp::from_millis(1)),
            CategoryFields {
                label: id.to_uppercase(),
                ..CategoryFields::default()
            },
        )
    }

    fn tombstone(id: &str) -> Category {
        let mut record = category(id);
        record.meta_mut().mark_deleted(Timestamp::from_millis(2));
        record
    }

    #[test]
    fn publish_filters_tombstones() {
        let model = ReadModel::new();
        model.publish(vec![category("a"), tombstone("b"), category("c")]);

        let ids: Vec<String> = model
            .records::<Category>()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(model.records::<Meeting>().is_empty());
        assert_eq!(model.snapshot().live_count(EntityKind::Category), 2);
    }

    #[test]
    fn upsert_and_remove() {
        let model = ReadModel::new();
        model.upsert(category("a"));
        model.upsert(category("b"));

        let mut renamed = category("a");
        renamed.fields_mut().label = "renamed".into();
        model.upsert(renamed);
        assert_eq!(
            model.get::<Category>(&"a".into()).unwrap().fields().label,
            "renamed"
        );

        model.upsert(tombstone("b"));
        assert!(model.get::<Category>(&"b".into()).is_none());

        let removed = model.remove::<Category>(&"a".into());
        assert!(removed.is_some());
        assert!(model.remove::<Category>(&"a".into()).is_none());
        assert!(model.records::<Category>().is_empty());
    }

    #[test]
    fn refresh_sees_current_set_and_can_decline() {
        let model = ReadModel::new();
        model.publish(vec![category("a")]);
        let version = model.version();

        let declined: Result<Option<usize>, ()> = model.refresh::<Category, _>(|current| {
            assert_eq!(current.len(), 1);
            Ok(None)
        });
        assert_eq!(declined, Ok(None));
        assert_eq!(model.version(), version);

        let live: Result<_, ()> = model.refresh::<Category, _>(|current| {
            let mut next = current.to_vec();
            next.push(category("b"));
            next.push(tombstone("c"));
            Ok(Some(next))
        });
        assert_eq!(live, Ok(Some(2)));
        assert_eq!(model.records::<Category>().len(), 2);

        let failed = model.refresh::<Category, _>(|_| Err("store down"));
        assert_eq!(failed, Err("store down"));
        assert_eq!(model.records::<Category>().len(), 2);
    }

    #[test]
    fn upserts_racing_a_refresh_are_not_lost() {
        let model = std::sync::Arc::new(ReadModel::new());
        let writer = {
            let model = std::sync::Arc::clone(&model);
            std::thread::spawn(move || {
                for i in 0..200 {
                    model.upsert(category(&format!("w{i}")));
                }
            })
        };
        for _ in 0..200 {
            let _: Result<_, ()> = model.refresh::<Category, _>(|current| Ok(Some(current.to_vec())));
        }
        writer.join().unwrap();

        assert_eq!(model.records::<Category>().len(), 200);
    }

    #[test]
    fn listeners_receive_events() {
        let model = ReadModel::new();
        let events = model.subscribe();
        let dropped = model.subscribe();
        drop(dropped);

        model.publish(vec![category("a"), category("b")]);
        model.remove::<Category>(&"a".into());

        assert_eq!(
            events.try_recv().unwrap(),
            ReadModelEvent {
                kind: EntityKind::Category,
                live_count: 2
            }
        );
        assert_eq!(events.try_recv().unwrap().live_count, 1);
        assert!(events.try_recv().is_err());
        assert_eq!(model.version(), 2);
        assert_eq!(model.listeners.lock().len(), 1);
    }
}
