//! Configuration for the sync engine.

use meetsync_model::DEFAULT_GRACE_WINDOW;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Age below which an unseen local-only record is still pending upload.
    pub grace_window: Duration,
    /// Age after which a held sync lock is considered stale.
    pub sync_lock_timeout: Duration,
    /// Age after which a held interaction lock is considered stale.
    pub interaction_lock_timeout: Duration,
    /// Delay between a delete completing and its interaction lock release.
    pub interaction_release_delay: Duration,
    /// Interval for automatic background sync.
    pub sync_interval: Option<Duration>,
    /// Whether the remote replica is configured.
    pub remote_enabled: bool,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            grace_window: DEFAULT_GRACE_WINDOW,
            sync_lock_timeout: Duration::from_secs(60),
            interaction_lock_timeout: Duration::from_secs(10),
            interaction_release_delay: Duration::from_secs(1),
            sync_interval: None,
            remote_enabled: true,
        }
    }

    /// Sets the grace window for local-only records.
    pub fn with_grace_window(mut self, window: Duration) -> Self {
        self.grace_window = window;
        self
    }

    /// Sets the sync lock staleness timeout.
    pub fn with_sync_lock_timeout(mut self, timeout: Duration) -> Self {
        self.sync_lock_timeout = timeout;
        self
    }

    /// Sets the interaction lock staleness timeout.
    pub fn with_interaction_lock_timeout(mut self, timeout: Duration) -> Self {
        self.interaction_lock_timeout = timeout;
        self
    }

    /// Sets the deferred interaction lock release delay.
    pub fn with_interaction_release_delay(mut self, delay: Duration) -> Self {
        self.interaction_release_delay = delay;
        self
    }

    /// Sets the interval for automatic sync.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Enables or disables the remote replica.
    pub fn with_remote_enabled(mut self, enabled: bool) -> Self {
        self.remote_enabled = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
