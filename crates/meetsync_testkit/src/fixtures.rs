//! Test fixtures and store helpers.
//!
//! Records built here carry explicit timestamps so that resolver outcomes are
//! deterministic.

use meetsync_model::{
    Blob, Category, CategoryFields, Entity, ManualClock, Meeting, MeetingFields, RecordId,
    RecordMeta, Stakeholder, StakeholderFields, Timestamp,
};
use meetsync_storage::FileTableStore;
use std::path::Path;
use tempfile::TempDir;

/// Builds a record of any kind with explicit metadata.
///
/// ```rust
/// use meetsync_model::{Category, Entity};
/// use meetsync_testkit::RecordBuilder;
///
/// let record = RecordBuilder::<Category>::new("c1")
///     .updated(200)
///     .deleted(150)
///     .build();
/// assert!(record.is_deleted());
/// ```
#[derive(Debug, Clone)]
pub struct RecordBuilder<R: Entity> {
    meta: RecordMeta,
    fields: R::Fields,
}

impl<R: Entity> RecordBuilder<R> {
    /// Starts a live record created and updated at time zero.
    pub fn new(id: &str) -> Self {
        Self {
            meta: RecordMeta::created(RecordId::from(id), Timestamp::EPOCH),
            fields: R::Fields::default(),
        }
    }

    /// Sets the creation time. Moves `updated_at` forward if needed.
    pub fn created(mut self, millis: i64) -> Self {
        self.meta.created_at = Timestamp::from_millis(millis);
        if self.meta.updated_at < self.meta.created_at {
            self.meta.updated_at = self.meta.created_at;
        }
        self
    }

    /// Sets the last modification time.
    pub fn updated(mut self, millis: i64) -> Self {
        self.meta.updated_at = Timestamp::from_millis(millis);
        self
    }

    /// Marks the record deleted at `millis` without touching `updated_at`.
    pub fn deleted(mut self, millis: i64) -> Self {
        self.meta.deleted = true;
        self.meta.deleted_at = Some(Timestamp::from_millis(millis));
        self
    }

    /// Marks the record deleted without a deletion time.
    pub fn deleted_without_time(mut self) -> Self {
        self.meta.deleted = true;
        self.meta.deleted_at = None;
        self
    }

    /// Replaces the payload.
    pub fn fields(mut self, fields: R::Fields) -> Self {
        self.fields = fields;
        self
    }

    /// Edits the payload in place.
    pub fn edit(mut self, edit: impl FnOnce(&mut R::Fields)) -> Self {
        edit(&mut self.fields);
        self
    }

    /// Builds the record.
    pub fn build(self) -> R {
        R::from_parts(self.meta, self.fields)
    }
}

/// A live meeting titled `title`, last updated at `updated`.
pub fn meeting(id: &str, updated: i64, title: &str) -> Meeting {
    RecordBuilder::<Meeting>::new(id)
        .updated(updated)
        .edit(|f| f.title = title.to_owned())
        .build()
}

/// A meeting carrying an audio recording of `audio_len` bytes.
pub fn meeting_with_audio(id: &str, updated: i64, audio_len: usize) -> Meeting {
    RecordBuilder::<Meeting>::new(id)
        .updated(updated)
        .fields(MeetingFields {
            title: format!("recorded {id}"),
            audio: Some(Blob::new("audio/webm", vec![7; audio_len])),
            ..MeetingFields::default()
        })
        .build()
}

/// A live stakeholder named `name`, last updated at `updated`.
pub fn stakeholder(id: &str, updated: i64, name: &str) -> Stakeholder {
    RecordBuilder::<Stakeholder>::new(id)
        .updated(updated)
        .fields(StakeholderFields {
            name: name.to_owned(),
            ..StakeholderFields::default()
        })
        .build()
}

/// A live category labelled `label`, last updated at `updated`.
pub fn category(id: &str, updated: i64, label: &str) -> Category {
    RecordBuilder::<Category>::new(id)
        .updated(updated)
        .fields(CategoryFields {
            key: id.to_owned(),
            label: label.to_owned(),
            ..CategoryFields::default()
        })
        .build()
}

/// A manual clock reading `millis`.
pub fn clock_at(millis: i64) -> ManualClock {
    ManualClock::new(Timestamp::from_millis(millis))
}

/// Ids of `records`, in order.
pub fn ids<R: Entity>(records: &[R]) -> Vec<String> {
    records.iter().map(|r| r.id().to_string()).collect()
}

/// A file-backed table store in a temporary directory.
///
/// The directory is removed when this value is dropped.
pub struct TempTables {
    /// The store.
    pub store: FileTableStore,
    dir: TempDir,
}

impl TempTables {
    /// Creates an empty store in a fresh temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileTableStore::open(dir.path()).expect("Failed to open table store");
        Self { store, dir }
    }

    /// The store directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Closes the store and returns its directory, for reopen tests.
    pub fn into_dir(self) -> TempDir {
        self.dir
    }
}

impl Default for TempTables {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempTables {
    type Target = FileTableStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}
