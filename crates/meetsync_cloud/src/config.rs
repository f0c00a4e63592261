//! Cloud store configuration.

/// Largest document the store accepts, matching common hosted document
/// databases.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 1024 * 1024;

/// Configuration for a [`crate::CloudStore`].
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Largest encoded document accepted by `save`.
    pub max_document_bytes: usize,
    /// Total number of writes accepted before every further write fails
    /// with a quota error. `None` means unlimited.
    pub write_quota: Option<u64>,
}

impl CloudConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            write_quota: None,
        }
    }

    /// Sets the document size limit.
    pub fn with_max_document_bytes(mut self, bytes: usize) -> Self {
        self.max_document_bytes = bytes;
        self
    }

    /// Sets the write quota.
    pub fn with_write_quota(mut self, writes: u64) -> Self {
        self.write_quota = Some(writes);
        self
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self::new()
    }
}
