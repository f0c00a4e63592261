//! Advisory locks with staleness recovery.
//!
//! The engine uses two independent locks:
//!
//! - The **sync lock** keeps two full-sync passes from running at once.
//! - The **interaction lock** keeps push deliveries from rewriting the
//!   UI-visible state while a user-initiated delete settles.
//!
//! Both are in-process advisory locks. A holder that never releases (a
//! crashed pass, a lost callback) is recovered once the lock outlives its
//! timeout, so neither lock can deadlock the engine.
//!
//! Work that must wait for a lock to clear registers a release hook with
//! [`AdvisoryLock::on_release`].

use crate::config::SyncConfig;
use meetsync_model::{SharedClock, Timestamp};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Identifies one acquisition of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockToken(u64);

/// State of an [`AdvisoryLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Not held.
    Free,
    /// Held since `acquired_at`.
    Held {
        /// When the lock was acquired.
        acquired_at: Timestamp,
        /// Acquisition that holds it.
        token: LockToken,
    },
}

type ReleaseHook = Box<dyn Fn() + Send + Sync>;

/// A binary lock that recovers from stale holders.
pub struct AdvisoryLock {
    name: &'static str,
    timeout: Duration,
    clock: SharedClock,
    state: Mutex<LockState>,
    next_token: AtomicU64,
    hooks: Mutex<Vec<ReleaseHook>>,
}

impl AdvisoryLock {
    /// Creates a free lock.
    pub fn new(name: &'static str, timeout: Duration, clock: SharedClock) -> Self {
        Self {
            name,
            timeout,
            clock,
            state: Mutex::new(LockState::Free),
            next_token: AtomicU64::new(1),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Lock name, for logging.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Staleness timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current state.
    pub fn state(&self) -> LockState {
        *self.state.lock()
    }

    /// Tries to take the lock. Returns `false` if someone else holds it.
    pub fn acquire(&self) -> bool {
        self.try_acquire().is_some()
    }

    /// Tries to take the lock, returning the acquisition token on success.
    ///
    /// A holder older than the timeout is evicted first.
    pub fn try_acquire(&self) -> Option<LockToken> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if let LockState::Held { acquired_at, .. } = *state {
            let age = now.saturating_since(acquired_at);
            if age > self.timeout {
                tracing::warn!(
                    lock = self.name,
                    age_ms = age.as_millis() as u64,
                    "recovering stale lock"
                );
                *state = LockState::Free;
            }
        }

        match *state {
            LockState::Held { .. } => None,
            LockState::Free => {
                let token = LockToken(self.next_token.fetch_add(1, Ordering::SeqCst));
                *state = LockState::Held {
                    acquired_at: now,
                    token,
                };
                Some(token)
            }
        }
    }

    /// Takes the lock and returns a guard that releases it on drop.
    pub fn guard(&self) -> Option<LockGuard<'_>> {
        self.try_acquire().map(|token| LockGuard { lock: self, token })
    }

    /// Frees the lock unconditionally.
    pub fn release(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), LockState::Free);
        if previous != LockState::Free {
            self.released();
        }
    }

    /// Frees the lock only if `token` still holds it.
    ///
    /// Returns false if the lock was already released, recovered as stale,
    /// or re-acquired by someone else.
    pub fn release_token(&self, token: LockToken) -> bool {
        let freed = {
            let mut state = self.state.lock();
            match *state {
                LockState::Held { token: held, .. } if held == token => {
                    *state = LockState::Free;
                    true
                }
                _ => false,
            }
        };
        if freed {
            self.released();
        }
        freed
    }

    /// Registers `hook` to run after every release of this lock.
    ///
    /// Hooks run on the releasing thread once the lock is already free. A
    /// hook must not register further hooks on the same lock.
    pub fn on_release(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    fn released(&self) {
        for hook in self.hooks.lock().iter() {
            hook();
        }
    }

    /// Returns true if the lock is held by a non-stale holder.
    pub fn is_held(&self) -> bool {
        match *self.state.lock() {
            LockState::Held { acquired_at, .. } => {
                self.clock.now().saturating_since(acquired_at) <= self.timeout
            }
            LockState::Free => false,
        }
    }
}

impl std::fmt::Debug for AdvisoryLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisoryLock")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("state", &self.state())
            .field("hooks", &self.hooks.lock().len())
            .finish()
    }
}

/// Releases its acquisition of an [`AdvisoryLock`] when dropped.
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a AdvisoryLock,
    token: LockToken,
}

impl LockGuard<'_> {
    /// The acquisition token.
    pub fn token(&self) -> LockToken {
        self.token
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_token(self.token);
    }
}

/// The engine's two locks.
#[derive(Debug)]
pub struct LockManager {
    sync: AdvisoryLock,
    interaction: AdvisoryLock,
    release_delay: Duration,
}

impl LockManager {
    /// Creates both locks with the timeouts from `config`.
    pub fn new(config: &SyncConfig, clock: SharedClock) -> Self {
        Self::with_timeouts(
            clock,
            config.sync_lock_timeout,
            config.interaction_lock_timeout,
            config.interaction_release_delay,
        )
    }

    /// Creates both locks with explicit timeouts.
    pub fn with_timeouts(
        clock: SharedClock,
        sync_timeout: Duration,
        interaction_timeout: Duration,
        release_delay: Duration,
    ) -> Self {
        Self {
            sync: AdvisoryLock::new("sync", sync_timeout, Arc::clone(&clock)),
            interaction: AdvisoryLock::new("interaction", interaction_timeout, clock),
            release_delay,
        }
    }

    /// The sync lock.
    pub fn sync(&self) -> &AdvisoryLock {
        &self.sync
    }

    /// The interaction lock.
    pub fn interaction(&self) -> &AdvisoryLock {
        &self.interaction
    }

    /// Returns true if either lock is held.
    pub fn any_held(&self) -> bool {
        self.sync.is_held() || self.interaction.is_held()
    }

    /// Starts a user interaction. Returns `None` if another one is running.
    pub fn begin_interaction(&self) -> Option<LockToken> {
        self.interaction.try_acquire()
    }

    /// Ends a user interaction after the configured release delay.
    ///
    /// The delay lets the remote echo of the just-issued write arrive while
    /// the UI state is still frozen.
    pub fn end_interaction(self: &Arc<Self>, token: LockToken) {
        if self.release_delay.is_zero() {
            self.interaction.release_token(token);
            return;
        }

        let locks = Arc::clone(self);
        let delay = self.release_delay;
        let spawned = std::thread::Builder::new()
            .name("meetsync-interaction-release".into())
            .spawn(move || {
                std::thread::sleep(delay);
                locks.interaction.release_token(token);
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "deferred release unavailable, releasing now");
            self.interaction.release_token(token);
        }
    }
}
