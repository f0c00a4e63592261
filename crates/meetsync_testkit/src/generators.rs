//! Property-based test generators using proptest.
//!
//! Ids are drawn from a small pool so that generated replicas overlap, and
//! timestamps from a narrow range so that ties and grace-window boundaries
//! actually occur.

use meetsync_model::{
    Blob, Category, CategoryFields, Entity, Meeting, MeetingFields, RecordId, RecordMeta,
    Timestamp,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Upper bound (exclusive) of generated creation and update times.
pub const MAX_GENERATED_MILLIS: i64 = 1_000_000;

/// Strategy for ids drawn from a pool of `pool` values.
pub fn record_id_strategy(pool: u8) -> impl Strategy<Value = RecordId> {
    (0..pool).prop_map(|n| RecordId::from(format!("r{n:02}")))
}

/// Strategy for record metadata with the given id.
///
/// About one record in four is a tombstone; some tombstones lack a deletion
/// time, as records written by older clients do.
pub fn meta_strategy(id: RecordId) -> impl Strategy<Value = RecordMeta> {
    (
        0..MAX_GENERATED_MILLIS / 2,
        0..MAX_GENERATED_MILLIS / 2,
        prop::bool::weighted(0.25),
        prop::option::of(0..MAX_GENERATED_MILLIS),
    )
        .prop_map(move |(created, age, deleted, deleted_at)| RecordMeta {
            id: id.clone(),
            created_at: Timestamp::from_millis(created),
            updated_at: Timestamp::from_millis(created + age),
            deleted,
            deleted_at: if deleted {
                deleted_at.map(Timestamp::from_millis)
            } else {
                None
            },
        })
}

/// Strategy for category payloads.
pub fn category_fields_strategy() -> impl Strategy<Value = CategoryFields> {
    (
        "[a-z]{1,8}",
        "[A-Za-z ]{0,16}",
        prop::option::of("#[0-9a-f]{6}"),
    )
        .prop_map(|(key, label, color)| CategoryFields {
            key,
            label,
            color,
            ..CategoryFields::default()
        })
}

/// Strategy for meeting payloads, some carrying binary fields.
pub fn meeting_fields_strategy() -> impl Strategy<Value = MeetingFields> {
    (
        "[A-Za-z ]{0,24}",
        "[a-z ]{0,32}",
        prop::option::of(prop::collection::vec(any::<u8>(), 1..64)),
        prop::collection::vec(prop::collection::vec(any::<u8>(), 1..16), 0..3),
    )
        .prop_map(|(title, notes, audio, images)| MeetingFields {
            title,
            notes,
            audio: audio.map(|data| Blob::new("audio/webm", data)),
            images: images
                .into_iter()
                .map(|data| Blob::new("image/png", data))
                .collect(),
            ..MeetingFields::default()
        })
}

/// Strategy for a single category with a pooled id.
pub fn category_strategy() -> impl Strategy<Value = Category> {
    record_id_strategy(16)
        .prop_flat_map(|id| (meta_strategy(id), category_fields_strategy()))
        .prop_map(|(meta, fields)| Category::new(meta, fields))
}

/// Strategy for one replica of categories: unique ids, ordered by id.
pub fn category_replica_strategy(max_len: usize) -> impl Strategy<Value = Vec<Category>> {
    prop::collection::vec(category_strategy(), 0..=max_len).prop_map(dedup_by_id)
}

/// Strategy for one replica of meetings: unique ids, ordered by id.
///
/// Meetings on the remote side never carry binary fields; use
/// [`strip_binaries`] on a generated replica to model that.
pub fn meeting_replica_strategy(max_len: usize) -> impl Strategy<Value = Vec<Meeting>> {
    prop::collection::vec(
        record_id_strategy(16)
            .prop_flat_map(|id| (meta_strategy(id), meeting_fields_strategy()))
            .prop_map(|(meta, fields)| Meeting::new(meta, fields)),
        0..=max_len,
    )
    .prop_map(dedup_by_id)
}

/// Strategy for the reconciliation clock.
///
/// Spans both sides of the default five-minute grace window relative to the
/// generated update times.
pub fn now_strategy() -> impl Strategy<Value = Timestamp> {
    (MAX_GENERATED_MILLIS / 2..MAX_GENERATED_MILLIS * 2).prop_map(Timestamp::from_millis)
}

/// Removes binary fields from every record.
pub fn strip_binaries<R: Entity>(records: Vec<R>) -> Vec<R> {
    records.iter().map(Entity::without_binary).collect()
}

/// Keeps the last record per id, ordered by id.
fn dedup_by_id<R: Entity>(records: Vec<R>) -> Vec<R> {
    let mut by_id: BTreeMap<RecordId, R> = BTreeMap::new();
    for record in records {
        by_id.insert(record.id().clone(), record);
    }
    by_id.into_values().collect()
}
