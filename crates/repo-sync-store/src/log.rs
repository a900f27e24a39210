//! Action history and root-digest history.
//!
//! [`ActionLog`] answers "what changed since digest D" for SYNC replies and
//! serves individual actions to FETCH. It is cleared by compaction.
//! [`DigestLog`] only remembers which roots this node has passed through, so
//! RECOVERY can still recognise a digest after the action log was trimmed.

use std::collections::{HashMap, HashSet, VecDeque};

use repo_sync_core::{ActionEntry, DigestValue, Name};

/// One applied action and the root digest right after applying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Root after this action was applied.
    pub root: DigestValue,
    /// The action.
    pub action: ActionEntry,
}

/// Append-only, digest-indexed action history since the last compaction.
#[derive(Debug, Clone)]
pub struct ActionLog {
    /// Root at the moment the log was (re)started.
    base: DigestValue,
    records: Vec<LogRecord>,
    by_digest: HashMap<DigestValue, usize>,
    by_name: HashMap<(Name, u64), usize>,
}

impl ActionLog {
    /// Start an empty log whose diffs are relative to `base`.
    pub fn new(base: DigestValue) -> Self {
        Self {
            base,
            records: Vec::new(),
            by_digest: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Append an action together with the root it produced.
    pub fn push(&mut self, root: DigestValue, action: ActionEntry) {
        let idx = self.records.len();
        self.by_digest.insert(root, idx);
        self.by_name
            .insert((action.creator().clone(), action.seq()), idx);
        self.records.push(LogRecord { root, action });
    }

    /// Everything applied strictly after the point where the root was
    /// `digest`, in log order. `None` if `digest` is not in this log.
    pub fn diff_since(&self, digest: &DigestValue) -> Option<&[LogRecord]> {
        if let Some(&idx) = self.by_digest.get(digest) {
            return Some(&self.records[idx + 1..]);
        }
        if *digest == self.base {
            return Some(&self.records);
        }
        None
    }

    /// Find a logged action by its (creator, seq) identity.
    pub fn find_by_action_name(&self, creator: &Name, seq: u64) -> Option<&ActionEntry> {
        self.by_name
            .get(&(creator.clone(), seq))
            .map(|&idx| &self.records[idx].action)
    }

    /// Whether `digest` is the base or any recorded root.
    pub fn contains_digest(&self, digest: &DigestValue) -> bool {
        *digest == self.base || self.by_digest.contains_key(digest)
    }

    /// Drop all records and restart from `base`.
    pub fn reset(&mut self, base: DigestValue) {
        self.base = base;
        self.records.clear();
        self.by_digest.clear();
        self.by_name.clear();
    }

    /// The digest this log's diffs start from.
    pub fn base(&self) -> DigestValue {
        self.base
    }

    /// Iterate records oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Bounded history of root digests. Survives compaction.
#[derive(Debug, Clone)]
pub struct DigestLog {
    order: VecDeque<DigestValue>,
    members: HashSet<DigestValue>,
    limit: Option<usize>,
}

impl DigestLog {
    /// Create a history. `limit` caps how many roots are remembered; the
    /// oldest are dropped first.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            limit,
        }
    }

    /// Remember `digest`. Re-pushing a known digest is a no-op.
    pub fn push(&mut self, digest: DigestValue) {
        if !self.members.insert(digest) {
            return;
        }
        self.order.push_back(digest);
        if let Some(limit) = self.limit {
            while self.order.len() > limit {
                if let Some(old) = self.order.pop_front() {
                    self.members.remove(&old);
                }
            }
        }
    }

    pub fn contains(&self, digest: &DigestValue) -> bool {
        self.members.contains(digest)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{empty_root, SyncTree};
    use repo_sync_core::ActionKind;

    fn creator() -> Name {
        Name::parse("/a").unwrap()
    }

    fn build(n: u64) -> (ActionLog, Vec<DigestValue>) {
        let mut tree = SyncTree::new();
        let mut log = ActionLog::new(tree.root());
        let mut roots = vec![tree.root()];
        for seq in 1..=n {
            let action = ActionEntry::local(
                creator(),
                Name::parse("/data").unwrap().append_seq(seq),
                ActionKind::Insert,
                seq,
                1,
            );
            let root = tree.update(&creator(), seq).unwrap();
            log.push(root, action);
            roots.push(root);
        }
        (log, roots)
    }

    #[test]
    fn test_diff_since_is_exact() {
        let (log, roots) = build(5);
        for (i, root) in roots.iter().enumerate() {
            let diff = log.diff_since(root).unwrap();
            let seqs: Vec<u64> = diff.iter().map(|r| r.action.seq()).collect();
            let expected: Vec<u64> = (i as u64 + 1..=5).collect();
            assert_eq!(seqs, expected);
        }
    }

    #[test]
    fn test_unknown_digest() {
        let (log, _) = build(2);
        let other = repo_sync_core::Digest::of_str("/elsewhere");
        assert!(log.diff_since(&other).is_none());
        assert!(!log.contains_digest(&other));
    }

    #[test]
    fn test_find_by_action_name() {
        let (log, _) = build(3);
        assert_eq!(log.find_by_action_name(&creator(), 2).unwrap().seq(), 2);
        assert!(log.find_by_action_name(&creator(), 4).is_none());
    }

    #[test]
    fn test_reset_reseeds_base() {
        let (mut log, roots) = build(3);
        log.reset(roots[3]);
        assert!(log.is_empty());
        assert_eq!(log.diff_since(&roots[3]).unwrap().len(), 0);
        assert!(log.diff_since(&roots[1]).is_none());
        assert!(!log.contains_digest(&empty_root()));
    }

    #[test]
    fn test_digest_log_bound() {
        let mut log = DigestLog::new(Some(2));
        let a = repo_sync_core::Digest::of_str("a");
        let b = repo_sync_core::Digest::of_str("b");
        let c = repo_sync_core::Digest::of_str("c");
        log.push(a);
        log.push(b);
        log.push(b);
        assert_eq!(log.len(), 2);
        log.push(c);
        assert!(!log.contains(&a));
        assert!(log.contains(&b));
        assert!(log.contains(&c));
    }

    #[test]
    fn test_digest_log_unbounded() {
        let mut log = DigestLog::new(None);
        for i in 0..100u64 {
            log.push(repo_sync_core::Digest::of_name_seq("/x", i));
        }
        assert_eq!(log.len(), 100);
    }
}
