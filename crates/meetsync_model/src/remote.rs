//! Remote store contract.
//!
//! The remote replica is a cloud document store: request/response calls for
//! single documents and full collections, plus a push subscription that
//! delivers the complete current set of a kind each time it changes.

use crate::record::{Entity, EntityKind, RecordId};
use std::fmt;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;
use thiserror::Error;

/// Result type for remote store calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors returned by a remote store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The store is not configured or cannot be reached.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// Network failure.
    #[error("network error: {0}")]
    Network(String),

    /// Authentication or authorization failed.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The remote quota is exhausted.
    #[error("remote quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A document could not be encoded or decoded.
    #[error("malformed {kind} document {id}: {message}")]
    Malformed {
        /// Kind of the document.
        kind: EntityKind,
        /// Document id.
        id: String,
        /// Decoder message.
        message: String,
    },
}

impl RemoteError {
    /// Returns true if a later attempt may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Unavailable(_) | RemoteError::Network(_) | RemoteError::QuotaExceeded(_)
        )
    }
}

/// A cloud document store holding the remote replica.
///
/// Implementations never store binary fields; callers pass records through
/// [`Entity::without_binary`] before saving, and implementations strip them
/// again on receipt.
pub trait RemoteStore: Send + Sync {
    /// Returns true if the store is configured and reachable.
    fn is_available(&self) -> bool;

    /// Fetches one record.
    fn get<R: Entity>(&self, id: &RecordId) -> RemoteResult<Option<R>>;

    /// Fetches every record of a kind, tombstones included.
    fn get_all<R: Entity>(&self) -> RemoteResult<Vec<R>>;

    /// Creates or replaces a record.
    fn save<R: Entity>(&self, record: &R) -> RemoteResult<()>;

    /// Physically removes a record.
    ///
    /// Administrative cleanup only; soft deletes go through [`Self::save`].
    fn delete(&self, kind: EntityKind, id: &RecordId) -> RemoteResult<bool>;

    /// Subscribes to a kind.
    ///
    /// The returned subscription receives the complete current set right away
    /// and again after every change.
    fn subscribe<R: Entity>(&self) -> RemoteResult<Subscription<R>>;
}

/// Cancels a subscription when invoked or dropped.
pub struct Unsubscribe {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Unsubscribe {
    /// Wraps a cancellation callback.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle that does nothing.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Cancels the subscription. Calling it again has no effect.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// A live push subscription for one entity kind.
///
/// Each delivery is the complete current remote set, not a diff. The
/// delivery channel closes once the subscription is cancelled.
pub struct Subscription<R> {
    deliveries: Receiver<Vec<R>>,
    unsubscribe: Unsubscribe,
}

impl<R: Entity> Subscription<R> {
    /// Creates a subscription from a delivery channel and its canceller.
    pub fn new(deliveries: Receiver<Vec<R>>, unsubscribe: Unsubscribe) -> Self {
        Self {
            deliveries,
            unsubscribe,
        }
    }

    /// The kind this subscription watches.
    pub fn kind(&self) -> EntityKind {
        R::KIND
    }

    /// Waits for the next delivery. Returns `None` once cancelled.
    pub fn recv(&self) -> Option<Vec<R>> {
        self.deliveries.recv().ok()
    }

    /// Waits up to `timeout` for the next delivery.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<R>> {
        match self.deliveries.recv_timeout(timeout) {
            Ok(records) => Some(records),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Cancels the subscription.
    pub fn unsubscribe(mut self) {
        self.unsubscribe.cancel();
    }

    /// Splits into the delivery channel and the cancellation handle, so the
    /// channel can move onto a consumer thread.
    pub fn into_parts(self) -> (Receiver<Vec<R>>, Unsubscribe) {
        (self.deliveries, self.unsubscribe)
    }
}

impl<R> fmt::Debug for Subscription<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("unsubscribe", &self.unsubscribe)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Category;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;

    #[test]
    fn retryable_errors() {
        assert!(RemoteError::Network("reset".into()).is_retryable());
        assert!(RemoteError::QuotaExceeded("daily".into()).is_retryable());
        assert!(RemoteError::Unavailable("offline".into()).is_retryable());
        assert!(!RemoteError::PermissionDenied("token".into()).is_retryable());
    }

    #[test]
    fn unsubscribe_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut handle = Unsubscribe::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.cancel();
        handle.cancel();
        drop(handle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscription_delivers_until_sender_dropped() {
        let (tx, rx) = mpsc::channel::<Vec<Category>>();
        let subscription = Subscription::new(rx, Unsubscribe::noop());
        assert_eq!(subscription.kind(), EntityKind::Category);

        tx.send(Vec::new()).unwrap();
        assert_eq!(subscription.recv(), Some(Vec::new()));

        drop(tx);
        assert_eq!(subscription.recv(), None);
        assert_eq!(subscription.recv_timeout(Duration::from_millis(5)), None);
    }
}
