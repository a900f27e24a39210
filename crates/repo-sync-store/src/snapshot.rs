//! Compacted checkpoints.
//!
//! A snapshot collapses everything a node knows into its object status table
//! and its `{creator -> last_seq}` table. It is served instead of individual
//! actions for sequence numbers that have been compacted away.

use std::collections::HashSet;

use repo_sync_core::{Name, ObjectStatus};
use serde::{Deserialize, Serialize};

use crate::index::ObjectIndex;
use crate::tree::SyncTree;

/// A checkpoint identified by (creator, version).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The node that built this snapshot.
    pub creator: Name,
    /// Per-creator snapshot counter.
    pub version: u64,
    /// Status of every known object, in name order.
    pub objects: Vec<(Name, ObjectStatus)>,
    /// Last applied seq per creator, in creator order.
    pub tree: Vec<(Name, u64)>,
}

impl Snapshot {
    /// Capture the current index and tree.
    pub fn capture(creator: Name, version: u64, index: &ObjectIndex, tree: &SyncTree) -> Self {
        Self {
            creator,
            version,
            objects: index.iter().map(|(n, s)| (n.clone(), s)).collect(),
            tree: tree.seqs(),
        }
    }

    /// The identity used to remember consumed snapshots.
    pub fn key(&self) -> SnapshotKey {
        SnapshotKey {
            creator: self.creator.clone(),
            version: self.version,
        }
    }
}

/// Identity of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    pub creator: Name,
    pub version: u64,
}

/// Snapshots consumed recently.
///
/// One snapshot can answer several in-flight fetches at once; only the first
/// copy is merged. Entries are forgotten explicitly once the memory window
/// has passed.
#[derive(Debug, Clone, Default)]
pub struct SeenSnapshots {
    seen: HashSet<SnapshotKey>,
}

impl SeenSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key`. Returns `false` if it was already recorded.
    pub fn insert(&mut self, key: SnapshotKey) -> bool {
        self.seen.insert(key)
    }

    pub fn contains(&self, key: &SnapshotKey) -> bool {
        self.seen.contains(key)
    }

    pub fn forget(&mut self, key: &SnapshotKey) {
        self.seen.remove(key);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[test]
    fn test_capture_copies_tables() {
        let mut index = ObjectIndex::new();
        index.set(n("/x"), ObjectStatus::Existed);
        index.set(n("/y"), ObjectStatus::Deleted);
        let mut tree = SyncTree::new();
        tree.update(&n("/a"), 4);
        tree.update(&n("/b"), 2);

        let snap = Snapshot::capture(n("/a"), 1, &index, &tree);
        assert_eq!(
            snap.objects,
            vec![(n("/x"), ObjectStatus::Existed), (n("/y"), ObjectStatus::Deleted)]
        );
        assert_eq!(snap.tree, vec![(n("/a"), 4), (n("/b"), 2)]);
        assert_eq!(snap.key().version, 1);
    }

    #[test]
    fn test_seen_registry() {
        let mut seen = SeenSnapshots::new();
        let key = SnapshotKey {
            creator: n("/a"),
            version: 3,
        };
        assert!(seen.insert(key.clone()));
        assert!(!seen.insert(key.clone()));
        seen.forget(&key);
        assert!(!seen.contains(&key));
        assert!(seen.is_empty());
    }
}
