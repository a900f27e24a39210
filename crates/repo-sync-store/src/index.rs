//! Object status table.
//!
//! Tracks, per object name, whether it exists, was deleted, or was
//! re-inserted. Only names and statuses are kept; payloads are not stored.

use std::collections::{BTreeMap, HashMap};

use repo_sync_core::{ActionEntry, ActionKind, Name, ObjectStatus, SnapshotMerge};
use tracing::debug;

/// Outcome of applying one action to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub before: ObjectStatus,
    pub after: ObjectStatus,
}

impl StatusChange {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Status per object name, plus per-(target, kind) version counters for
/// locally generated actions.
#[derive(Debug, Clone, Default)]
pub struct ObjectIndex {
    statuses: BTreeMap<Name, ObjectStatus>,
    versions: HashMap<(Name, ActionKind), u64>,
}

impl ObjectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status of `name`. Unknown names are [`ObjectStatus::None`].
    pub fn status(&self, name: &Name) -> ObjectStatus {
        self.statuses.get(name).copied().unwrap_or_default()
    }

    /// Overwrite the status of `name`.
    pub fn set(&mut self, name: Name, status: ObjectStatus) {
        if status == ObjectStatus::None {
            self.statuses.remove(&name);
        } else {
            self.statuses.insert(name, status);
        }
    }

    /// Bump and return the version counter for a local action.
    pub fn next_version(&mut self, target: &Name, kind: ActionKind) -> u64 {
        let counter = self.versions.entry((target.clone(), kind)).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Apply the status effect of an action (local or fetched).
    ///
    /// Deletes only take effect when `model_deletions` is set.
    pub fn apply(&mut self, action: &ActionEntry, model_deletions: bool) -> StatusChange {
        let target = action.target();
        let before = self.status(target);
        let after = match action.kind() {
            ActionKind::Insert => before.after_insert(),
            ActionKind::Delete if model_deletions => before.after_delete(),
            ActionKind::Delete => before,
        };
        self.set(target.clone(), after);
        StatusChange { before, after }
    }

    /// Merge one snapshot entry and return what the caller must do.
    ///
    /// A `Fetch` outcome already records the new status; the caller is
    /// expected to request the object's content.
    pub fn merge(&mut self, name: &Name, incoming: ObjectStatus) -> SnapshotMerge {
        let local = self.status(name);
        let merge = local.merge_from_snapshot(incoming);
        match merge {
            SnapshotMerge::Keep => {}
            SnapshotMerge::Fetch(status) => self.set(name.clone(), status),
            SnapshotMerge::MarkDeleted => self.set(name.clone(), ObjectStatus::Deleted),
        }
        merge
    }

    /// Forget every tombstone. Returns how many were removed.
    pub fn purge_tombstones(&mut self) -> usize {
        let before = self.statuses.len();
        self.statuses.retain(|_, s| *s != ObjectStatus::Deleted);
        let purged = before - self.statuses.len();
        if purged > 0 {
            debug!(purged, "purged tombstones");
        }
        purged
    }

    /// Iterate `(name, status)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&Name, ObjectStatus)> {
        self.statuses.iter().map(|(n, s)| (n, *s))
    }

    /// Number of objects whose content is present.
    pub fn present_count(&self) -> usize {
        self.statuses.values().filter(|s| s.is_present()).count()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn action(kind: ActionKind, seq: u64) -> ActionEntry {
        ActionEntry::new(n("/a"), seq, kind, n("/x"), 1)
    }

    #[test]
    fn test_insert_delete_reinsert() {
        let mut index = ObjectIndex::new();
        assert_eq!(index.apply(&action(ActionKind::Insert, 1), true).after, ObjectStatus::Existed);
        assert_eq!(index.apply(&action(ActionKind::Delete, 2), true).after, ObjectStatus::Deleted);
        assert_eq!(index.apply(&action(ActionKind::Insert, 3), true).after, ObjectStatus::Inserted);
        assert_eq!(index.status(&n("/x")), ObjectStatus::Inserted);
    }

    #[test]
    fn test_delete_ignored_without_deletion_model() {
        let mut index = ObjectIndex::new();
        index.apply(&action(ActionKind::Insert, 1), false);
        let change = index.apply(&action(ActionKind::Delete, 2), false);
        assert!(!change.changed());
        assert_eq!(index.status(&n("/x")), ObjectStatus::Existed);
    }

    #[test]
    fn test_reapply_is_idempotent() {
        let mut index = ObjectIndex::new();
        index.apply(&action(ActionKind::Insert, 1), true);
        let change = index.apply(&action(ActionKind::Insert, 1), true);
        assert!(!change.changed());
    }

    #[test]
    fn test_merge_records_status() {
        let mut index = ObjectIndex::new();
        assert_eq!(
            index.merge(&n("/x"), ObjectStatus::Existed),
            SnapshotMerge::Fetch(ObjectStatus::Existed)
        );
        assert_eq!(index.status(&n("/x")), ObjectStatus::Existed);
        assert_eq!(index.merge(&n("/x"), ObjectStatus::Deleted), SnapshotMerge::MarkDeleted);
        assert_eq!(index.merge(&n("/x"), ObjectStatus::Existed), SnapshotMerge::Keep);
        assert_eq!(index.status(&n("/x")), ObjectStatus::Deleted);
    }

    #[test]
    fn test_versions_count_per_target_and_kind() {
        let mut index = ObjectIndex::new();
        assert_eq!(index.next_version(&n("/x"), ActionKind::Insert), 1);
        assert_eq!(index.next_version(&n("/x"), ActionKind::Insert), 2);
        assert_eq!(index.next_version(&n("/x"), ActionKind::Delete), 1);
        assert_eq!(index.next_version(&n("/y"), ActionKind::Insert), 1);
    }

    #[test]
    fn test_purge_tombstones() {
        let mut index = ObjectIndex::new();
        index.set(n("/x"), ObjectStatus::Deleted);
        index.set(n("/y"), ObjectStatus::Existed);
        assert_eq!(index.purge_tombstones(), 1);
        assert_eq!(index.status(&n("/x")), ObjectStatus::None);
        assert_eq!(index.len(), 1);
        assert_eq!(index.present_count(), 1);
    }
}
