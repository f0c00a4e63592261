//! Conflict detection and resolution.
//!
//! [`reconcile`] merges a local and a remote snapshot of one entity kind into
//! a single record set and reports which records each replica is missing.
//!
//! # Rules
//!
//! Records are joined by id. For each id in the union:
//!
//! - Present on both sides with either copy deleted: the delete wins, whatever
//!   the timestamps say.
//! - Present on both sides, neither deleted: the strictly newer `updated_at`
//!   wins. Ties keep the local copy.
//! - Local only: uploaded while inside the grace window, otherwise presumed
//!   deleted elsewhere and converted to a tombstone.
//! - Remote only: downloaded.
//!
//! Whenever the remote copy is chosen, local binary fields are re-attached,
//! because the remote store never holds them.
//!
//! The function performs no I/O and cannot fail.

use crate::record::{Entity, RecordId};
use crate::time::Timestamp;
use std::collections::BTreeMap;
use std::time::Duration;

/// Default age after which an unseen local-only record is presumed deleted.
pub const DEFAULT_GRACE_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Inputs to [`reconcile`] besides the two record sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Current time.
    pub now: Timestamp,
    /// Age below which a local-only record is treated as pending upload.
    pub grace_window: Duration,
}

impl ReconcileOptions {
    /// Options with the default grace window.
    pub fn at(now: Timestamp) -> Self {
        Self {
            now,
            grace_window: DEFAULT_GRACE_WINDOW,
        }
    }

    /// Sets the grace window.
    pub fn with_grace_window(mut self, grace_window: Duration) -> Self {
        self.grace_window = grace_window;
        self
    }
}

/// Which replica's copy a merged record was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The local copy.
    Local,
    /// The remote copy.
    Remote,
}

/// How a single id was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Both sides present, at least one deleted.
    DeleteWins(Winner),
    /// Both sides present and live; newer timestamp won.
    NewerWins(Winner),
    /// Both sides present, live and equally recent.
    Tie,
    /// Only the local side had it and it is still inside the grace window.
    LocalOnly,
    /// Only the local side had it and the grace window has passed.
    Expired,
    /// Only the remote side had it.
    RemoteOnly,
}

/// Result of reconciling one entity kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<R> {
    /// Every record from both inputs after conflict resolution, ordered by id.
    pub merged: Vec<R>,
    /// Records the remote replica must receive.
    pub to_upload: Vec<R>,
    /// Records the local replica must receive.
    pub to_download: Vec<R>,
}

impl<R: Entity> Reconciliation<R> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            merged: Vec::with_capacity(capacity),
            to_upload: Vec::new(),
            to_download: Vec::new(),
        }
    }

    /// Number of live (non-deleted) merged records.
    pub fn live_count(&self) -> usize {
        self.merged.iter().filter(|r| !r.is_deleted()).count()
    }

    /// Number of tombstones in the merged set.
    pub fn tombstone_count(&self) -> usize {
        self.merged.len() - self.live_count()
    }

    /// Merged records that are not tombstones.
    pub fn live(&self) -> impl Iterator<Item = &R> {
        self.merged.iter().filter(|r| !r.is_deleted())
    }

    /// Returns true if the merged set is at least as large as either input.
    pub fn preserves_size(&self, local_len: usize, remote_len: usize) -> bool {
        self.merged.len() >= local_len.max(remote_len)
    }
}

/// Merges `local` and `remote` into one record set.
///
/// Duplicate ids within one input keep the last occurrence.
pub fn reconcile<R: Entity>(
    local: &[R],
    remote: &[R],
    options: ReconcileOptions,
) -> Reconciliation<R> {
    let mut pairs: BTreeMap<&RecordId, (Option<&R>, Option<&R>)> = BTreeMap::new();
    for record in local {
        pairs.entry(record.id()).or_default().0 = Some(record);
    }
    for record in remote {
        pairs.entry(record.id()).or_default().1 = Some(record);
    }

    let mut result = Reconciliation::with_capacity(pairs.len());
    for (_, pair) in pairs {
        let (record, resolution) = match pair {
            (Some(local), Some(remote)) => resolve_pair(local, remote, options.now),
            (Some(local), None) => resolve_local_only(local, options),
            (None, Some(remote)) => (seal(remote.clone(), options.now), Resolution::RemoteOnly),
            (None, None) => continue,
        };

        match resolution {
            Resolution::DeleteWins(Winner::Local) | Resolution::NewerWins(Winner::Local) => {
                result.to_upload.push(record.clone());
            }
            Resolution::DeleteWins(Winner::Remote)
            | Resolution::NewerWins(Winner::Remote)
            | Resolution::RemoteOnly => {
                result.to_download.push(record.clone());
            }
            Resolution::LocalOnly => {
                if !record.is_deleted() {
                    result.to_upload.push(record.clone());
                }
            }
            Resolution::Tie | Resolution::Expired => {}
        }
        result.merged.push(record);
    }

    result
}

/// Resolves one id present in both replicas.
///
/// `DeleteWins(Local)` means only the local copy was deleted, so the remote
/// replica needs the tombstone; when both copies are already deleted the
/// outcome is reported as [`Resolution::Tie`].
pub fn resolve_pair<R: Entity>(local: &R, remote: &R, now: Timestamp) -> (R, Resolution) {
    let (l, r) = (local.meta(), remote.meta());

    if l.deleted || r.deleted {
        let take_remote = match (l.deleted, r.deleted) {
            (true, false) => false,
            (false, true) => true,
            _ => r.updated_at > l.updated_at,
        };
        let mut merged = if take_remote {
            with_local_binary(remote, local)
        } else {
            local.clone()
        };
        let deleted_at = match (l.deleted_at, r.deleted_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let meta = merged.meta_mut();
        meta.deleted = true;
        meta.deleted_at = Some(deleted_at.unwrap_or(now));

        let resolution = match (l.deleted, r.deleted) {
            (true, false) => Resolution::DeleteWins(Winner::Local),
            (false, true) => Resolution::DeleteWins(Winner::Remote),
            _ => Resolution::Tie,
        };
        return (merged, resolution);
    }

    if r.updated_at > l.updated_at {
        (
            with_local_binary(remote, local),
            Resolution::NewerWins(Winner::Remote),
        )
    } else if l.updated_at > r.updated_at {
        (local.clone(), Resolution::NewerWins(Winner::Local))
    } else {
        (local.clone(), Resolution::Tie)
    }
}

fn resolve_local_only<R: Entity>(local: &R, options: ReconcileOptions) -> (R, Resolution) {
    if local.is_deleted() {
        return (seal(local.clone(), options.now), Resolution::LocalOnly);
    }

    let age = options.now.saturating_since(local.meta().last_write());
    if age <= options.grace_window {
        return (local.clone(), Resolution::LocalOnly);
    }

    tracing::debug!(
        kind = %R::KIND,
        id = %local.id(),
        age_ms = age.as_millis() as u64,
        "local-only record past grace window, converting to tombstone"
    );
    let mut tombstone = local.clone();
    tombstone.meta_mut().mark_deleted(options.now);
    (tombstone, Resolution::Expired)
}

fn with_local_binary<R: Entity>(remote: &R, local: &R) -> R {
    let mut merged = remote.clone();
    merged.adopt_binary(local);
    merged
}

/// Gives a tombstone without a deletion time the current time.
fn seal<R: Entity>(mut record: R, now: Timestamp) -> R {
    let meta = record.meta_mut();
    if meta.deleted && meta.deleted_at.is_none() {
        meta.deleted_at = Some(now);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Category, CategoryFields, Meeting, MeetingFields};
    use crate::record::{Blob, RecordMeta};

    const NOW: Timestamp = Timestamp::from_millis(1_000);

    fn meeting(id: &str, updated: i64, title: &str) -> Meeting {
        let mut meta = RecordMeta::created(id.into(), Timestamp::from_millis(updated));
        meta.updated_at = Timestamp::from_millis(updated);
        Meeting::new(
            meta,
            MeetingFields {
                title: title.into(),
                ..MeetingFields::default()
            },
        )
    }

    fn deleted(mut meeting: Meeting, at: Option<i64>) -> Meeting {
        meeting.meta.deleted = true;
        meeting.meta.deleted_at = at.map(Timestamp::from_millis);
        meeting
    }

    fn ids<R: Entity>(records: &[R]) -> Vec<&str> {
        records.iter().map(|r| r.id().as_str()).collect()
    }

    #[test]
    fn remote_delete_beats_newer_local_edit() {
        let local = meeting("1", 100, "A");
        let remote = deleted(meeting("1", 200, ""), None);

        let result = reconcile(&[local], &[remote], ReconcileOptions::at(NOW));

        assert_eq!(result.merged.len(), 1);
        let merged = &result.merged[0];
        assert!(merged.meta.deleted);
        assert_eq!(merged.meta.updated_at, Timestamp::from_millis(200));
        assert_eq!(merged.meta.deleted_at, Some(NOW));
        assert!(result.to_upload.is_empty());
        assert_eq!(ids(&result.to_download), vec!["1"]);
    }

    #[test]
    fn local_delete_beats_newer_remote_edit() {
        let local = deleted(meeting("1", 100, "A"), Some(90));
        let remote = meeting("1", 900, "B");

        let result = reconcile(&[local], &[remote], ReconcileOptions::at(NOW));

        let merged = &result.merged[0];
        assert!(merged.meta.deleted);
        assert_eq!(merged.fields.title, "A");
        assert_eq!(merged.meta.deleted_at, Some(Timestamp::from_millis(90)));
        assert_eq!(ids(&result.to_upload), vec!["1"]);
        assert!(result.to_download.is_empty());
    }

    #[test]
    fn both_deleted_keeps_earliest_deletion_and_routes_nowhere() {
        let local = deleted(meeting("1", 300, "A"), Some(250));
        let remote = deleted(meeting("1", 200, "A"), Some(150));

        let result = reconcile(&[local], &[remote], ReconcileOptions::at(NOW));

        assert_eq!(
            result.merged[0].meta.deleted_at,
            Some(Timestamp::from_millis(150))
        );
        assert_eq!(result.merged[0].meta.updated_at, Timestamp::from_millis(300));
        assert!(result.to_upload.is_empty());
        assert!(result.to_download.is_empty());
    }

    #[test]
    fn newer_remote_wins_and_keeps_local_audio() {
        let mut local = meeting("1", 100, "old");
        local.fields.audio = Some(Blob::new("audio/webm", vec![7; 32]));
        let remote = meeting("1", 200, "new");

        let result = reconcile(&[local.clone()], &[remote], ReconcileOptions::at(NOW));

        let merged = &result.merged[0];
        assert_eq!(merged.fields.title, "new");
        assert_eq!(merged.fields.audio, local.fields.audio);
        assert_eq!(ids(&result.to_download), vec!["1"]);
        assert!(result.to_upload.is_empty());
    }

    #[test]
    fn newer_local_wins_and_uploads() {
        let local = meeting("1", 300, "mine");
        let remote = meeting("1", 200, "theirs");

        let result = reconcile(&[local], &[remote], ReconcileOptions::at(NOW));

        assert_eq!(result.merged[0].fields.title, "mine");
        assert_eq!(ids(&result.to_upload), vec!["1"]);
        assert!(result.to_download.is_empty());
    }

    #[test]
    fn tie_keeps_local_copy() {
        let local = meeting("1", 200, "mine");
        let remote = meeting("1", 200, "theirs");

        let result = reconcile(&[local], &[remote], ReconcileOptions::at(NOW));

        assert_eq!(result.merged[0].fields.title, "mine");
        assert!(result.to_upload.is_empty());
        assert!(result.to_download.is_empty());
    }

    #[test]
    fn local_only_inside_grace_window_is_uploaded() {
        let local = meeting("2", 50, "draft");

        let result = reconcile::<Meeting>(&[local], &[], ReconcileOptions::at(NOW));

        assert_eq!(ids(&result.merged), vec!["2"]);
        assert!(!result.merged[0].meta.deleted);
        assert_eq!(ids(&result.to_upload), vec!["2"]);
    }

    #[test]
    fn local_only_past_grace_window_becomes_tombstone() {
        let now = Timestamp::from_millis(60 * 60 * 1000);
        let created = now.saturating_sub(Duration::from_secs(10 * 60));
        let local = meeting("3", created.as_millis(), "stale");

        let result = reconcile::<Meeting>(&[local], &[], ReconcileOptions::at(now));

        assert_eq!(result.merged.len(), 1);
        assert!(result.merged[0].meta.deleted);
        assert_eq!(result.merged[0].meta.deleted_at, Some(now));
        assert!(result.to_upload.is_empty());
        assert!(result.to_download.is_empty());
    }

    #[test]
    fn grace_window_is_configurable() {
        let local = meeting("4", 0, "x");
        let options = ReconcileOptions::at(Timestamp::from_millis(2_000))
            .with_grace_window(Duration::from_secs(1));

        let result = reconcile::<Meeting>(&[local], &[], options);
        assert!(result.merged[0].meta.deleted);
    }

    #[test]
    fn local_only_tombstone_is_kept_but_not_uploaded() {
        let local = deleted(meeting("5", 100, "gone"), None);

        let result = reconcile::<Meeting>(&[local], &[], ReconcileOptions::at(NOW));

        assert!(result.merged[0].meta.deleted);
        assert_eq!(result.merged[0].meta.deleted_at, Some(NOW));
        assert!(result.to_upload.is_empty());
    }

    #[test]
    fn remote_only_is_downloaded() {
        let remote = meeting("6", 100, "elsewhere");

        let result = reconcile::<Meeting>(&[], &[remote], ReconcileOptions::at(NOW));

        assert_eq!(ids(&result.merged), vec!["6"]);
        assert_eq!(ids(&result.to_download), vec!["6"]);
    }

    #[test]
    fn merged_is_sorted_and_never_shrinks() {
        let local = vec![meeting("c", 10, ""), meeting("a", 10, "")];
        let remote = vec![meeting("b", 10, ""), meeting("a", 20, "")];

        let result = reconcile(&local, &remote, ReconcileOptions::at(NOW));

        assert_eq!(ids(&result.merged), vec!["a", "b", "c"]);
        assert!(result.preserves_size(local.len(), remote.len()));
        assert_eq!(result.live_count(), 3);
        assert_eq!(result.tombstone_count(), 0);
    }

    #[test]
    fn second_pass_against_same_remote_is_stable() {
        let local = vec![
            meeting("1", 100, "a"),
            deleted(meeting("2", 100, "b"), None),
            meeting("3", 400, "c"),
        ];
        let remote = vec![
            deleted(meeting("1", 50, ""), None),
            meeting("2", 500, "b2"),
            meeting("3", 300, "c-old"),
            meeting("4", 10, "d"),
        ];
        let options = ReconcileOptions::at(NOW);

        let first = reconcile(&local, &remote, options);
        let second = reconcile(&first.merged, &remote, options);

        assert_eq!(second.merged, first.merged);
    }

    #[test]
    fn categories_resolve_like_meetings() {
        let mut meta = RecordMeta::created("c1".into(), Timestamp::from_millis(10));
        let local = Category::new(
            meta.clone(),
            CategoryFields {
                key: "sales".into(),
                label: "Sales".into(),
                ..CategoryFields::default()
            },
        );
        meta.updated_at = Timestamp::from_millis(20);
        let remote = Category::new(
            meta,
            CategoryFields {
                key: "sales".into(),
                label: "Revenue".into(),
                ..CategoryFields::default()
            },
        );

        let result = reconcile(&[local], &[remote], ReconcileOptions::at(NOW));
        assert_eq!(result.merged[0].fields.label, "Revenue");
    }
}
