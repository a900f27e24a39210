//! The sync tree: per-creator high-water marks folded into one root digest.
//!
//! Entries are kept in a `BTreeMap` keyed by creator name, so the root is
//! computed over sub-digests in creator-name order and depends only on the
//! final `{creator -> last_seq}` map, never on update arrival order.

use std::collections::BTreeMap;

use repo_sync_core::{Digest, DigestValue, Name};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Root digest of a tree with no creators.
pub fn empty_root() -> DigestValue {
    Digest::of_str("/root")
}

/// Sub-digest for `creator` at `seq`: H(uri(creator ‖ seq) ‖ seq).
fn sub_digest(creator: &Name, seq: u64) -> DigestValue {
    Digest::of_name_seq(&creator.clone().append_seq(seq).to_uri(), seq)
}

/// What the tree knows about one creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Compaction boundary. Requests for seq at or below this (when nonzero)
    /// are answered with a snapshot.
    pub first_snapshot_seq: u64,
    /// Highest sequence number applied. Never decreases.
    pub last_seq: u64,
    /// Contribution of this creator to the root.
    pub digest: DigestValue,
}

impl TreeEntry {
    fn baseline(creator: &Name) -> Self {
        Self {
            first_snapshot_seq: 0,
            last_seq: 0,
            digest: sub_digest(creator, 0),
        }
    }

    /// Whether `seq` falls inside the compacted range.
    pub fn is_compacted(&self, seq: u64) -> bool {
        self.first_snapshot_seq != 0 && seq <= self.first_snapshot_seq
    }
}

/// Per-creator high-water-mark table with a cached root digest.
#[derive(Debug, Clone)]
pub struct SyncTree {
    entries: BTreeMap<Name, TreeEntry>,
    root: DigestValue,
}

impl SyncTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            root: empty_root(),
        }
    }

    /// The cached root digest.
    pub fn root(&self) -> DigestValue {
        self.root
    }

    /// Raise `creator`'s high-water mark to `seq`.
    ///
    /// Returns the new root, or `None` when `seq <= last_seq` and nothing
    /// changed. Unknown creators are added on the fly.
    pub fn update(&mut self, creator: &Name, seq: u64) -> Option<DigestValue> {
        let entry = self
            .entries
            .entry(creator.clone())
            .or_insert_with(|| TreeEntry::baseline(creator));
        if seq <= entry.last_seq {
            return None;
        }
        entry.last_seq = seq;
        entry.digest = sub_digest(creator, seq);
        self.root = self.calculate_digest();
        trace!(%creator, seq, root = %self.root, "tree updated");
        Some(self.root)
    }

    /// Start tracking `creator` at seq 0. Returns `false` if already known.
    pub fn add_node(&mut self, creator: &Name) -> bool {
        if self.entries.contains_key(creator) {
            return false;
        }
        self.entries
            .insert(creator.clone(), TreeEntry::baseline(creator));
        self.root = self.calculate_digest();
        true
    }

    /// Mark the current high-water marks as the compaction point.
    pub fn update_for_snapshot(&mut self) {
        for entry in self.entries.values_mut() {
            entry.first_snapshot_seq = entry.last_seq;
        }
    }

    /// Recompute the root from every entry in creator order.
    pub fn calculate_digest(&self) -> DigestValue {
        if self.entries.is_empty() {
            return empty_root();
        }
        Digest::chain(self.entries.values().map(|e| &e.digest))
    }

    /// Look up one creator.
    pub fn lookup(&self, creator: &Name) -> Option<&TreeEntry> {
        self.entries.get(creator)
    }

    /// Highest applied seq for `creator`, 0 if unknown.
    pub fn last_seq(&self, creator: &Name) -> u64 {
        self.entries.get(creator).map_or(0, |e| e.last_seq)
    }

    /// Iterate entries in creator-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&Name, &TreeEntry)> {
        self.entries.iter()
    }

    /// `{creator -> last_seq}` in creator-name order.
    pub fn seqs(&self) -> Vec<(Name, u64)> {
        self.entries
            .iter()
            .map(|(name, e)| (name.clone(), e.last_seq))
            .collect()
    }

    /// Number of creators tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no creator is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SyncTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[test]
    fn test_empty_root() {
        let tree = SyncTree::new();
        assert_eq!(tree.root(), empty_root());
        assert_eq!(tree.calculate_digest(), empty_root());
    }

    #[test]
    fn test_stale_update_is_noop() {
        let mut tree = SyncTree::new();
        let a = name("/a");
        let root = tree.update(&a, 3).unwrap();
        assert_eq!(tree.update(&a, 3), None);
        assert_eq!(tree.update(&a, 2), None);
        assert_eq!(tree.root(), root);
        assert_eq!(tree.last_seq(&a), 3);
    }

    #[test]
    fn test_add_node_changes_root() {
        let mut tree = SyncTree::new();
        assert!(tree.add_node(&name("/a")));
        assert!(!tree.add_node(&name("/a")));
        assert_ne!(tree.root(), empty_root());
        assert_eq!(tree.last_seq(&name("/a")), 0);
    }

    #[test]
    fn test_update_for_snapshot_marks_boundary() {
        let mut tree = SyncTree::new();
        let a = name("/a");
        tree.update(&a, 5);
        tree.update_for_snapshot();
        let entry = tree.lookup(&a).unwrap();
        assert_eq!(entry.first_snapshot_seq, 5);
        assert!(entry.is_compacted(5));
        assert!(!entry.is_compacted(6));
    }

    #[test]
    fn test_unsnapshotted_entry_never_compacted() {
        let mut tree = SyncTree::new();
        tree.update(&name("/a"), 2);
        assert!(!tree.lookup(&name("/a")).unwrap().is_compacted(0));
    }

    proptest! {
        /// Any interleaving of updates that ends at the same map yields the
        /// same root.
        #[test]
        fn prop_root_independent_of_order(
            updates in proptest::collection::vec((0usize..4, 1u64..20), 1..40),
        ) {
            let creators = ["/a", "/b", "/c", "/d"].map(name);

            let mut forward = SyncTree::new();
            for (i, seq) in &updates {
                forward.update(&creators[*i], *seq);
            }
            let mut backward = SyncTree::new();
            for (i, seq) in updates.iter().rev() {
                backward.update(&creators[*i], *seq);
            }

            prop_assert_eq!(forward.seqs(), backward.seqs());
            prop_assert_eq!(forward.root(), backward.root());
        }

        /// Observed last_seq never decreases.
        #[test]
        fn prop_last_seq_monotone(seqs in proptest::collection::vec(0u64..50, 1..40)) {
            let a = name("/a");
            let mut tree = SyncTree::new();
            let mut high = 0;
            for seq in seqs {
                tree.update(&a, seq);
                prop_assert!(tree.last_seq(&a) >= high);
                high = tree.last_seq(&a);
            }
        }
    }
}
