//! Actions: the atomic, immutable mutations exchanged between repositories.
//!
//! An action is identified by its creator and a per-creator sequence number.
//! Its name is `creator ‖ seq`, and its digest contribution covers only that
//! name and the sequence number.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::digest::{Digest, DigestValue};
use crate::name::Name;

/// What an action does to its target object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActionKind {
    /// The target object was inserted.
    Insert = 0,
    /// The target object was deleted.
    Delete = 1,
}

impl ActionKind {
    /// Convert to u8 for serialization.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Insert),
            1 => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Insert => f.write_str("insert"),
            ActionKind::Delete => f.write_str("delete"),
        }
    }
}

/// The digest contribution of `creator ‖ seq`.
fn action_digest(creator: &Name, seq: u64) -> DigestValue {
    let name = creator.clone().append_seq(seq);
    Digest::of_name_seq(&name.to_uri(), seq)
}

/// A (creator, seq) pair with no payload.
///
/// This is what sync and recovery replies carry: enough to know that an
/// action exists and to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionName {
    /// The creating repository.
    pub creator: Name,
    /// Sequence number within the creator's log (1-based).
    pub seq: u64,
}

impl ActionName {
    /// Create an action name.
    pub fn new(creator: Name, seq: u64) -> Self {
        Self { creator, seq }
    }

    /// `creator ‖ seq`.
    pub fn name(&self) -> Name {
        self.creator.clone().append_seq(self.seq)
    }

    /// The digest contribution, identical to that of the full action.
    pub fn digest(&self) -> DigestValue {
        action_digest(&self.creator, self.seq)
    }
}

/// One immutable state mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEntry {
    creator: Name,
    seq: u64,
    kind: ActionKind,
    target: Name,
    version: u64,
}

impl ActionEntry {
    /// Build an action from all of its fields, as decoded from the wire.
    pub fn new(creator: Name, seq: u64, kind: ActionKind, target: Name, version: u64) -> Self {
        Self {
            creator,
            seq,
            kind,
            target,
            version,
        }
    }

    /// Build a locally generated action. The engine assigns `seq` and
    /// `version` before calling this.
    pub fn local(creator: Name, target: Name, kind: ActionKind, seq: u64, version: u64) -> Self {
        Self::new(creator, seq, kind, target, version)
    }

    /// The creating repository.
    pub fn creator(&self) -> &Name {
        &self.creator
    }

    /// Sequence number within the creator's log.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Insert or delete.
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// The object this action mutates.
    pub fn target(&self) -> &Name {
        &self.target
    }

    /// How many times the creator has applied this kind to this target.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// `creator ‖ seq`.
    pub fn name(&self) -> Name {
        self.creator.clone().append_seq(self.seq)
    }

    /// The name-only view of this action.
    pub fn action_name(&self) -> ActionName {
        ActionName::new(self.creator.clone(), self.seq)
    }

    /// The digest contribution: H(uri(creator ‖ seq) ‖ seq).
    ///
    /// Kind, target and version are not covered.
    pub fn digest(&self) -> DigestValue {
        action_digest(&self.creator, self.seq)
    }
}

impl PartialOrd for ActionEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.seq.cmp(&other.seq))
    }
}
