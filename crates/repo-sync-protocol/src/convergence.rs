//! Convergence verification.
//!
//! Equal root digests mean two repositories applied the same
//! `{creator -> last_seq}` table. The root does not cover action kinds or
//! targets, so verification also compares a hash of the object status
//! table.

use repo_sync_core::{DigestValue, Name, ObjectStatus};
use repo_sync_store::{ObjectIndex, SyncTree};

/// Compute a deterministic hash of an object status table.
///
/// Algorithm:
/// 1. Walk objects in name order
/// 2. Hash: H = Blake3(prefix || uri || 0 || status || ...)
/// 3. Return final H
pub fn compute_index_hash(index: &ObjectIndex) -> DigestValue {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"repo-sync-index-v0:");
    for (name, status) in index.iter() {
        hasher.update(name.to_uri().as_bytes());
        hasher.update(&[0]);
        hasher.update(&[status.to_wire().unwrap_or(u8::MAX)]);
    }
    DigestValue::from_bytes(*hasher.finalize().as_bytes())
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Same root and same object statuses.
    Converged,
    /// Roots differ; more sync rounds may be needed.
    NotConverged { reason: String },
    /// Roots agree but an object's status does not. The root cannot tell
    /// two different mutations at the same seq apart.
    StatusMismatch {
        object: Name,
        local: ObjectStatus,
        remote: ObjectStatus,
    },
}

impl ConvergenceResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }

    pub fn is_status_mismatch(&self) -> bool {
        matches!(self, ConvergenceResult::StatusMismatch { .. })
    }
}

/// Verify two replicas have converged.
pub fn verify_convergence(
    local_tree: &SyncTree,
    local_index: &ObjectIndex,
    remote_tree: &SyncTree,
    remote_index: &ObjectIndex,
) -> ConvergenceResult {
    if local_tree.root() != remote_tree.root() {
        let local = local_tree.seqs();
        let remote = remote_tree.seqs();
        let reason = local
            .iter()
            .find(|entry| !remote.contains(entry))
            .or_else(|| remote.iter().find(|entry| !local.contains(entry)))
            .map(|(creator, _)| {
                format!(
                    "last_seq mismatch for {creator}: local={}, remote={}",
                    local_tree.last_seq(creator),
                    remote_tree.last_seq(creator)
                )
            })
            .unwrap_or_else(|| "root mismatch".into());
        return ConvergenceResult::NotConverged { reason };
    }

    if compute_index_hash(local_index) == compute_index_hash(remote_index) {
        return ConvergenceResult::Converged;
    }

    let mismatch = local_index
        .iter()
        .map(|(name, status)| (name.clone(), status, remote_index.status(name)))
        .chain(
            remote_index
                .iter()
                .map(|(name, status)| (name.clone(), local_index.status(name), status)),
        )
        .find(|(_, local, remote)| local != remote);

    match mismatch {
        Some((object, local, remote)) => ConvergenceResult::StatusMismatch {
            object,
            local,
            remote,
        },
        None => ConvergenceResult::Converged,
    }
}

/// Verify every replica against the first one.
pub fn verify_all(replicas: &[(&SyncTree, &ObjectIndex)]) -> Vec<ConvergenceResult> {
    let Some((first_tree, first_index)) = replicas.first() else {
        return Vec::new();
    };
    replicas
        .iter()
        .skip(1)
        .map(|(tree, index)| verify_convergence(first_tree, first_index, tree, index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use repo_sync_core::{ActionEntry, ActionKind};

    fn n(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn replica(actions: &[(u64, ActionKind, &str)]) -> (SyncTree, ObjectIndex) {
        let mut tree = SyncTree::new();
        let mut index = ObjectIndex::new();
        for (seq, kind, target) in actions {
            let action = ActionEntry::new(n("/a"), *seq, *kind, n(target), 1);
            tree.update(action.creator(), *seq);
            index.apply(&action, true);
        }
        (tree, index)
    }

    #[test]
    fn test_index_hash_deterministic() {
        let (_, index) = replica(&[(1, ActionKind::Insert, "/x"), (2, ActionKind::Insert, "/y")]);
        assert_eq!(compute_index_hash(&index), compute_index_hash(&index.clone()));
        assert_ne!(compute_index_hash(&index), compute_index_hash(&ObjectIndex::new()));
    }

    #[test]
    fn test_converged() {
        let (ta, ia) = replica(&[(1, ActionKind::Insert, "/x")]);
        let (tb, ib) = replica(&[(1, ActionKind::Insert, "/x")]);
        assert!(verify_convergence(&ta, &ia, &tb, &ib).is_converged());
    }

    #[test]
    fn test_seq_mismatch() {
        let (ta, ia) = replica(&[(1, ActionKind::Insert, "/x"), (2, ActionKind::Delete, "/x")]);
        let (tb, ib) = replica(&[(1, ActionKind::Insert, "/x")]);
        match verify_convergence(&ta, &ia, &tb, &ib) {
            ConvergenceResult::NotConverged { reason } => assert!(reason.contains("/a")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_same_root_different_status() {
        let (ta, ia) = replica(&[(1, ActionKind::Insert, "/x")]);
        let (tb, ib) = replica(&[(1, ActionKind::Insert, "/y")]);
        let result = verify_convergence(&ta, &ia, &tb, &ib);
        assert!(result.is_status_mismatch());
    }

    #[test]
    fn test_verify_all() {
        let (ta, ia) = replica(&[(1, ActionKind::Insert, "/x")]);
        let (tb, ib) = replica(&[(1, ActionKind::Insert, "/x")]);
        let (tc, ic) = replica(&[]);
        let results = verify_all(&[(&ta, &ia), (&tb, &ib), (&tc, &ic)]);
        assert!(results[0].is_converged());
        assert!(!results[1].is_converged());
    }
}
