//! Sync protocol message types and their wire encoding.
//!
//! There is one envelope with a type tag: ACTION carries either a list of
//! action names (sync and recovery replies) or exactly one full action
//! (fetch replies); SNAPSHOT carries a compacted checkpoint.

use std::collections::HashMap;

use bytes::Bytes;
use ciborium::value::Value;

use repo_sync_core::{ActionEntry, ActionKind, ActionName, Name, ObjectStatus};
use repo_sync_store::Snapshot;

use crate::codec::{self, entry, text, uint, MapView};
use crate::error::{Result, SyncError};

/// Envelope field keys (integer keys for compact encoding).
mod keys {
    pub const TYPE: u64 = 0;
    pub const STATES: u64 = 1;
    pub const SNAPSHOT_CREATOR: u64 = 2;
    pub const SNAPSHOT_VERSION: u64 = 3;
    pub const OBJECTS: u64 = 4;
    pub const NODES: u64 = 5;
}

/// Keys inside one ACTION state entry.
mod state_keys {
    pub const CREATOR: u64 = 0;
    pub const SEQ: u64 = 1;
    pub const KIND: u64 = 2;
    pub const TARGET: u64 = 3;
    pub const VERSION: u64 = 4;
}

/// Keys inside snapshot object and node entries.
mod pair_keys {
    pub const NAME: u64 = 0;
    pub const VALUE: u64 = 1;
}

/// Envelope type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Action = 0,
    Snapshot = 1,
}

impl MessageType {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Action),
            1 => Some(Self::Snapshot),
            _ => None,
        }
    }
}

/// A decoded sync message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// (creator, seq) pairs: a diff, or a full creator table.
    ActionNames(Vec<ActionName>),
    /// Exactly one full action.
    Action(ActionEntry),
    /// A compacted checkpoint.
    Snapshot(Snapshot),
}

/// One creator's entry in an action-name list, with the highest seq the
/// list names for that creator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub creator: Name,
    pub seq: u64,
    pub final_seq: u64,
}

impl SyncMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            SyncMessage::ActionNames(_) | SyncMessage::Action(_) => MessageType::Action,
            SyncMessage::Snapshot(_) => MessageType::Snapshot,
        }
    }

    /// Encode to deterministic CBOR.
    pub fn encode(&self) -> Result<Bytes> {
        let value = self.to_value();
        Ok(Bytes::from(codec::encode(&value)?))
    }

    /// Decode from CBOR. Fails on any missing required field.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value = codec::decode(bytes)?;
        let map = MapView::new(&value, "envelope")?;
        let tag = map.u64(keys::TYPE, "type")?;
        let message_type = u8::try_from(tag)
            .ok()
            .and_then(MessageType::from_u8)
            .ok_or_else(|| SyncError::MalformedMessage(format!("unknown message type {tag}")))?;

        match message_type {
            MessageType::Action => decode_action_message(&map),
            MessageType::Snapshot => decode_snapshot(&map).map(SyncMessage::Snapshot),
        }
    }

    fn to_value(&self) -> Value {
        let mut entries = vec![entry(keys::TYPE, uint(self.message_type().to_u8().into()))];
        match self {
            SyncMessage::ActionNames(names) => {
                let states = names
                    .iter()
                    .map(|n| {
                        Value::Map(vec![
                            entry(state_keys::CREATOR, text(n.creator.to_uri())),
                            entry(state_keys::SEQ, uint(n.seq)),
                        ])
                    })
                    .collect();
                entries.push(entry(keys::STATES, Value::Array(states)));
            }
            SyncMessage::Action(action) => {
                let state = Value::Map(vec![
                    entry(state_keys::CREATOR, text(action.creator().to_uri())),
                    entry(state_keys::SEQ, uint(action.seq())),
                    entry(state_keys::KIND, uint(action.kind().to_u8().into())),
                    entry(state_keys::TARGET, text(action.target().to_uri())),
                    entry(state_keys::VERSION, uint(action.version())),
                ]);
                entries.push(entry(keys::STATES, Value::Array(vec![state])));
            }
            SyncMessage::Snapshot(snapshot) => {
                entries.push(entry(keys::SNAPSHOT_CREATOR, text(snapshot.creator.to_uri())));
                entries.push(entry(keys::SNAPSHOT_VERSION, uint(snapshot.version)));
                let objects = snapshot
                    .objects
                    .iter()
                    .filter_map(|(name, status)| {
                        let code = status.to_wire()?;
                        Some(Value::Map(vec![
                            entry(pair_keys::NAME, text(name.to_uri())),
                            entry(pair_keys::VALUE, uint(code.into())),
                        ]))
                    })
                    .collect();
                entries.push(entry(keys::OBJECTS, Value::Array(objects)));
                let nodes = snapshot
                    .tree
                    .iter()
                    .map(|(creator, seq)| {
                        Value::Map(vec![
                            entry(pair_keys::NAME, text(creator.to_uri())),
                            entry(pair_keys::VALUE, uint(*seq)),
                        ])
                    })
                    .collect();
                entries.push(entry(keys::NODES, Value::Array(nodes)));
            }
        }
        Value::Map(entries)
    }
}

fn decode_action_message(map: &MapView<'_>) -> Result<SyncMessage> {
    let states = map.array(keys::STATES, "states")?;
    let mut names = Vec::with_capacity(states.len());
    let mut full = Vec::new();

    for state in states {
        let state = MapView::new(state, "action state")?;
        let creator = Name::parse(state.text(state_keys::CREATOR, "creator")?)?;
        let seq = state.u64(state_keys::SEQ, "seq")?;
        match state.opt_u64(state_keys::KIND, "kind")? {
            None => names.push(ActionName::new(creator, seq)),
            Some(kind) => {
                let kind = u8::try_from(kind)
                    .ok()
                    .and_then(ActionKind::from_u8)
                    .ok_or_else(|| {
                        SyncError::MalformedMessage(format!("unsupported action kind {kind}"))
                    })?;
                let target = Name::parse(state.text(state_keys::TARGET, "target")?)?;
                let version = state.u64(state_keys::VERSION, "version")?;
                full.push(ActionEntry::new(creator, seq, kind, target, version));
            }
        }
    }

    match (full.len(), names.len()) {
        (0, _) => Ok(SyncMessage::ActionNames(names)),
        (1, 0) => Ok(SyncMessage::Action(full.remove(0))),
        _ => Err(SyncError::MalformedMessage(
            "action message must carry names only or exactly one action".into(),
        )),
    }
}

fn decode_snapshot(map: &MapView<'_>) -> Result<Snapshot> {
    let creator = Name::parse(map.text(keys::SNAPSHOT_CREATOR, "snapshot creator")?)?;
    let version = map.u64(keys::SNAPSHOT_VERSION, "snapshot version")?;

    let mut objects = Vec::new();
    for item in map.array(keys::OBJECTS, "objects")? {
        let item = MapView::new(item, "snapshot object")?;
        let name = Name::parse(item.text(pair_keys::NAME, "object name")?)?;
        let code = item.u64(pair_keys::VALUE, "object status")?;
        let status = u8::try_from(code)
            .ok()
            .and_then(ObjectStatus::from_wire)
            .ok_or_else(|| SyncError::MalformedMessage(format!("invalid object status {code}")))?;
        objects.push((name, status));
    }

    let mut tree = Vec::new();
    for item in map.array(keys::NODES, "nodes")? {
        let item = MapView::new(item, "snapshot node")?;
        let creator = Name::parse(item.text(pair_keys::NAME, "node creator")?)?;
        let seq = item.u64(pair_keys::VALUE, "node seq")?;
        tree.push((creator, seq));
    }

    Ok(Snapshot {
        creator,
        version,
        objects,
        tree,
    })
}

/// Turn an action-name list into per-entry advertisements.
///
/// Entries for `own` are skipped: a node never fetches its own actions. Each
/// advertisement carries the highest seq the list names for that creator.
pub fn advertisements(names: &[ActionName], own: &Name) -> Vec<Advertisement> {
    let mut finals: HashMap<&Name, u64> = HashMap::new();
    for name in names.iter().filter(|n| &n.creator != own) {
        let high = finals.entry(&name.creator).or_insert(0);
        *high = (*high).max(name.seq);
    }
    names
        .iter()
        .filter(|n| &n.creator != own)
        .map(|n| Advertisement {
            creator: n.creator.clone(),
            seq: n.seq,
            final_seq: finals.get(&n.creator).copied().unwrap_or(n.seq),
        })
        .collect()
}
