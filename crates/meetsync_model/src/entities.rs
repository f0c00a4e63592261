//! The concrete record kinds: meetings, stakeholders and categories.

use crate::record::{Blob, Entity, EntityKind, RecordId, RecordMeta};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque forward-compatible metadata carried by every payload.
pub type ExtraFields = BTreeMap<String, serde_json::Value>;

macro_rules! impl_entity {
    ($record:ty, $fields:ty, $kind:expr $(, { $($binary:tt)* })?) => {
        impl $record {
            /// Creates a record from metadata and payload.
            pub fn new(meta: RecordMeta, fields: $fields) -> Self {
                Self { meta, fields }
            }
        }

        impl Entity for $record {
            type Fields = $fields;

            const KIND: EntityKind = $kind;

            fn from_parts(meta: RecordMeta, fields: Self::Fields) -> Self {
                Self { meta, fields }
            }

            fn meta(&self) -> &RecordMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut RecordMeta {
                &mut self.meta
            }

            fn fields(&self) -> &Self::Fields {
                &self.fields
            }

            fn fields_mut(&mut self) -> &mut Self::Fields {
                &mut self.fields
            }

            $($($binary)*)?
        }
    };
}

/// A meeting record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    /// Lifecycle metadata.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Payload.
    #[serde(flatten)]
    pub fields: MeetingFields,
}

/// Meeting payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeetingFields {
    /// Meeting title.
    pub title: String,
    /// When the meeting takes place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<Timestamp>,
    /// Free-form notes.
    pub notes: String,
    /// Speech transcript.
    pub transcript: String,
    /// Generated analysis of the transcript.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    /// Participants.
    pub stakeholder_ids: Vec<RecordId>,
    /// Classification labels.
    pub category_ids: Vec<RecordId>,
    /// Audio recording. Local only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Blob>,
    /// Whiteboard photos and other images. Local only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Blob>,
    /// Top-level keys this version does not know, kept for round-trips.
    #[serde(flatten)]
    pub extra: ExtraFields,
}

// Audio and images never leave the local record store.
impl_entity!(Meeting, MeetingFields, EntityKind::Meeting, {
    fn without_binary(&self) -> Self {
        let mut stripped = self.clone();
        stripped.fields.audio = None;
        stripped.fields.images = Vec::new();
        stripped
    }

    fn adopt_binary(&mut self, donor: &Self) {
        self.fields.audio = donor.fields.audio.clone();
        self.fields.images = donor.fields.images.clone();
    }

    fn has_binary(&self) -> bool {
        self.fields.audio.is_some() || !self.fields.images.is_empty()
    }
});

impl Meeting {
    /// Total size of the local-only binary payload in bytes.
    pub fn binary_len(&self) -> usize {
        self.fields.audio.as_ref().map_or(0, Blob::len)
            + self.fields.images.iter().map(Blob::len).sum::<usize>()
    }
}

/// A stakeholder (contact) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stakeholder {
    /// Lifecycle metadata.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Payload.
    #[serde(flatten)]
    pub fields: StakeholderFields,
}

/// Stakeholder payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StakeholderFields {
    /// Display name.
    pub name: String,
    /// Contact email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Role or title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Company or team.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Free-form notes.
    pub notes: String,
    /// Top-level keys this version does not know, kept for round-trips.
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl_entity!(Stakeholder, StakeholderFields, EntityKind::Stakeholder);

/// A category (label) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Lifecycle metadata.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Payload.
    #[serde(flatten)]
    pub fields: CategoryFields,
}

/// Category payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CategoryFields {
    /// Human-readable secondary key used by legacy references.
    pub key: String,
    /// Display label.
    pub label: String,
    /// Display color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Top-level keys this version does not know, kept for round-trips.
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl_entity!(Category, CategoryFields, EntityKind::Category);
