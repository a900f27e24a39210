//! Object status and the rules that move it.
//!
//! Status is only ever changed by a local insert/delete, by applying a
//! fetched action, or by merging a snapshot. Deletion tombstones are sticky
//! against stale `Existed` replay; an explicit re-insert wins over absence
//! and over a tombstone. At most one delete-then-reinsert cycle per name is
//! assumed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a repository knows about one object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ObjectStatus {
    /// Never seen.
    #[default]
    None,
    /// Present.
    Existed,
    /// Deleted (tombstone).
    Deleted,
    /// Re-inserted after a deletion.
    Inserted,
}

/// What merging one snapshot entry asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMerge {
    /// Leave the local status untouched.
    Keep,
    /// Fetch the object's content and record the given status.
    Fetch(ObjectStatus),
    /// Record a tombstone.
    MarkDeleted,
}

impl ObjectStatus {
    /// Whether the object's content is served locally.
    pub fn is_present(self) -> bool {
        matches!(self, ObjectStatus::Existed | ObjectStatus::Inserted)
    }

    /// Status after an insert (local, or applied from a fetched action).
    pub fn after_insert(self) -> ObjectStatus {
        match self {
            ObjectStatus::None => ObjectStatus::Existed,
            ObjectStatus::Deleted => ObjectStatus::Inserted,
            other => other,
        }
    }

    /// Status after a delete. Only a plain `Existed` object becomes a
    /// tombstone; a re-inserted object stays.
    pub fn after_delete(self) -> ObjectStatus {
        match self {
            ObjectStatus::Existed => ObjectStatus::Deleted,
            other => other,
        }
    }

    /// Decide how an incoming snapshot entry merges into this local status.
    ///
    /// | incoming \ local | None | Existed | Deleted | Inserted |
    /// |---|---|---|---|---|
    /// | Existed  | fetch → Existed | keep | keep | keep |
    /// | Deleted  | keep | → Deleted | keep | keep |
    /// | Inserted | fetch → Existed | keep | fetch → Inserted | keep |
    pub fn merge_from_snapshot(self, incoming: ObjectStatus) -> SnapshotMerge {
        match (incoming, self) {
            (ObjectStatus::Existed, ObjectStatus::None) => {
                SnapshotMerge::Fetch(ObjectStatus::Existed)
            }
            (ObjectStatus::Deleted, ObjectStatus::Existed) => SnapshotMerge::MarkDeleted,
            (ObjectStatus::Inserted, ObjectStatus::None | ObjectStatus::Deleted) => {
                SnapshotMerge::Fetch(self.after_insert())
            }
            _ => SnapshotMerge::Keep,
        }
    }

    /// Convert to u8 for serialization. `None` is never put on the wire.
    pub fn to_wire(self) -> Option<u8> {
        match self {
            ObjectStatus::Existed => Some(0),
            ObjectStatus::Deleted => Some(1),
            ObjectStatus::Inserted => Some(2),
            ObjectStatus::None => None,
        }
    }

    /// Try to parse a wire status.
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(ObjectStatus::Existed),
            1 => Some(ObjectStatus::Deleted),
            2 => Some(ObjectStatus::Inserted),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectStatus::None => "none",
            ObjectStatus::Existed => "existed",
            ObjectStatus::Deleted => "deleted",
            ObjectStatus::Inserted => "inserted",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ObjectStatus::*;

    #[test]
    fn test_merge_table() {
        let cases = [
            (Existed, None, SnapshotMerge::Fetch(Existed)),
            (Existed, Existed, SnapshotMerge::Keep),
            (Existed, Deleted, SnapshotMerge::Keep),
            (Existed, Inserted, SnapshotMerge::Keep),
            (Deleted, None, SnapshotMerge::Keep),
            (Deleted, Existed, SnapshotMerge::MarkDeleted),
            (Deleted, Deleted, SnapshotMerge::Keep),
            (Deleted, Inserted, SnapshotMerge::Keep),
            (Inserted, None, SnapshotMerge::Fetch(Existed)),
            (Inserted, Existed, SnapshotMerge::Keep),
            (Inserted, Deleted, SnapshotMerge::Fetch(Inserted)),
            (Inserted, Inserted, SnapshotMerge::Keep),
        ];
        for (incoming, local, expected) in cases {
            assert_eq!(
                local.merge_from_snapshot(incoming),
                expected,
                "incoming={incoming} local={local}"
            );
        }
    }

    #[test]
    fn test_tombstone_survives_stale_existed() {
        assert_eq!(Deleted.merge_from_snapshot(Existed), SnapshotMerge::Keep);
    }

    #[test]
    fn test_insert_delete_transitions() {
        assert_eq!(None.after_insert(), Existed);
        assert_eq!(Deleted.after_insert(), Inserted);
        assert_eq!(Existed.after_insert(), Existed);
        assert_eq!(Existed.after_delete(), Deleted);
        assert_eq!(Inserted.after_delete(), Inserted);
        assert_eq!(None.after_delete(), None);
    }

    #[test]
    fn test_wire_codes() {
        for status in [Existed, Deleted, Inserted] {
            let code = status.to_wire().unwrap();
            assert_eq!(ObjectStatus::from_wire(code), Some(status));
        }
        assert_eq!(None.to_wire(), Option::None);
        assert_eq!(ObjectStatus::from_wire(9), Option::None);
    }
}
