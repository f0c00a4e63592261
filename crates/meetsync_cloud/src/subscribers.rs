//! Push subscriber registry.

use meetsync_model::{Entity, EntityKind, Subscription, Unsubscribe};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

/// Decodes a full document set and sends it to one subscriber. Returns false
/// once the subscriber is gone.
type Listener = Box<dyn Fn(&[(String, Value)]) -> bool + Send>;

/// Subscribers per kind.
#[derive(Default)]
pub(crate) struct Registry {
    listeners: Mutex<HashMap<EntityKind, BTreeMap<u64, Listener>>>,
    next_id: AtomicU64,
}

impl Registry {
    /// Registers a subscriber for `R`, delivering `current` to it first.
    ///
    /// The initial delivery and the registration happen under one lock, so
    /// no change can slip between them.
    pub(crate) fn subscribe<R: Entity>(
        self: &Arc<Self>,
        current: impl FnOnce() -> Vec<(String, Value)>,
    ) -> Subscription<R> {
        let (tx, rx) = mpsc::channel();
        let listener = listener::<R>(tx);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        {
            let mut listeners = self.listeners.lock();
            listener(&current());
            listeners.entry(R::KIND).or_default().insert(id, listener);
        }
        tracing::debug!(kind = %R::KIND, subscriber = id, "subscriber added");

        let registry = Arc::clone(self);
        let unsubscribe = Unsubscribe::new(move || registry.remove(R::KIND, id));
        Subscription::new(rx, unsubscribe)
    }

    /// Sends the set produced by `current` to every subscriber of `kind`.
    ///
    /// `current` runs under the registry lock, so deliveries reach each
    /// subscriber in the order the changes were made.
    pub(crate) fn broadcast(&self, kind: EntityKind, current: impl FnOnce() -> Vec<(String, Value)>) {
        let mut listeners = self.listeners.lock();
        let Some(subscribers) = listeners.get_mut(&kind) else {
            return;
        };
        if subscribers.is_empty() {
            return;
        }
        let documents = current();
        subscribers.retain(|id, listener| {
            let alive = listener(&documents);
            if !alive {
                tracing::debug!(%kind, subscriber = *id, "dropping disconnected subscriber");
            }
            alive
        });
    }

    /// Number of live subscribers of `kind`.
    pub(crate) fn count(&self, kind: EntityKind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, BTreeMap::len)
    }

    fn remove(&self, kind: EntityKind, id: u64) {
        if let Some(subscribers) = self.listeners.lock().get_mut(&kind) {
            subscribers.remove(&id);
        }
        tracing::debug!(%kind, subscriber = id, "subscriber removed");
    }
}

fn listener<R: Entity>(tx: Sender<Vec<R>>) -> Listener {
    Box::new(move |documents| {
        let records = documents
            .iter()
            .filter_map(|(id, value)| match serde_json::from_value::<R>(value.clone()) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(kind = %R::KIND, %id, error = %e, "skipping malformed document");
                    None
                }
            })
            .collect();
        tx.send(records).is_ok()
    })
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.lock();
        let counts: BTreeMap<EntityKind, usize> =
            listeners.iter().map(|(kind, l)| (*kind, l.len())).collect();
        f.debug_struct("Registry").field("subscribers", &counts).finish()
    }
}
