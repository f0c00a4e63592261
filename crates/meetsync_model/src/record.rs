//! Record identity, lifecycle metadata and the [`Entity`] trait.

use crate::time::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, globally unique record identifier.
///
/// Assigned once at creation and never reused. It is the only join key used
/// when reconciling two replicas.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Mints a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three synchronized entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    /// Meeting notes, transcripts and recordings.
    Meeting,
    /// Contact metadata.
    Stakeholder,
    /// Labels used to classify meetings.
    Category,
}

impl EntityKind {
    /// All kinds, in sync order.
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Meeting,
        EntityKind::Stakeholder,
        EntityKind::Category,
    ];

    /// Table / collection name used by both stores.
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Meeting => "meetings",
            EntityKind::Stakeholder => "stakeholders",
            EntityKind::Category => "categories",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Lifecycle fields shared by every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    /// Record identifier.
    pub id: RecordId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
    /// Soft-delete flag. A record with this set is a tombstone.
    #[serde(default)]
    pub deleted: bool,
    /// When the record was deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
}

impl RecordMeta {
    /// Metadata for a record created at `now`.
    pub fn created(id: RecordId, now: Timestamp) -> Self {
        Self {
            id,
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
        }
    }

    /// Bumps `updated_at` to `now` without ever moving it backwards.
    pub fn touch(&mut self, now: Timestamp) {
        self.updated_at = self.updated_at.max(now);
    }

    /// Marks the record as a tombstone.
    pub fn mark_deleted(&mut self, now: Timestamp) {
        self.deleted = true;
        self.deleted_at = Some(self.deleted_at.map_or(now, |at| at.min(now)));
        self.touch(now);
    }

    /// The time of the last local write.
    pub fn last_write(&self) -> Timestamp {
        self.created_at.max(self.updated_at)
    }
}

/// A binary attachment kept only in the local record store.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// MIME type of the payload.
    pub mime_type: String,
    /// Raw bytes.
    pub data: Vec<u8>,
}

impl Blob {
    /// Creates a blob.
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// A synchronized record kind.
///
/// Implementors split their payload into text fields, which travel to every
/// replica, and binary fields, which stay in the local record store.
pub trait Entity:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Payload fields (everything except the lifecycle metadata).
    type Fields: Clone + PartialEq + fmt::Debug + Default + Send + Sync + 'static;

    /// The kind this type represents.
    const KIND: EntityKind;

    /// Builds a record from metadata and payload.
    fn from_parts(meta: RecordMeta, fields: Self::Fields) -> Self;

    /// Lifecycle metadata.
    fn meta(&self) -> &RecordMeta;

    /// Mutable lifecycle metadata.
    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// Payload fields.
    fn fields(&self) -> &Self::Fields;

    /// Mutable payload fields.
    fn fields_mut(&mut self) -> &mut Self::Fields;

    /// Record identifier.
    fn id(&self) -> &RecordId {
        &self.meta().id
    }

    /// Returns true if this record is a tombstone.
    fn is_deleted(&self) -> bool {
        self.meta().deleted
    }

    /// Returns a copy without binary fields, as sent to the remote store.
    fn without_binary(&self) -> Self {
        self.clone()
    }

    /// Copies binary fields from `donor` into `self`.
    fn adopt_binary(&mut self, _donor: &Self) {}

    /// Returns true if any binary field is populated.
    fn has_binary(&self) -> bool {
        false
    }
}
