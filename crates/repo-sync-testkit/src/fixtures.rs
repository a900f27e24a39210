//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::time::Duration;

use repo_sync_core::{ActionEntry, ActionKind, Name};
use repo_sync_protocol::SyncConfig;
use repo_sync_store::{ActionLog, ObjectIndex, SyncTree};

use crate::sim::Simulation;

/// Parse a name, panicking on invalid input.
pub fn name(uri: &str) -> Name {
    Name::parse(uri).expect("valid name")
}

/// Default config for `creator` with a fixed jitter seed.
pub fn config(creator: &str, seed: u64) -> SyncConfig {
    SyncConfig::for_creator(creator).with_seed(seed)
}

/// Creator names `/repo/a`, `/repo/b`, ...
pub fn creators(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("/repo/{}", char::from(b'a' + (i % 26) as u8)))
        .collect()
}

/// A simulation with `count` nodes started at time zero.
pub fn mesh(count: usize) -> (Simulation, Vec<Name>) {
    let mut sim = Simulation::new();
    let nodes = creators(count)
        .iter()
        .enumerate()
        .map(|(i, creator)| {
            sim.add_node(config(creator, i as u64 + 1))
                .expect("node starts")
        })
        .collect();
    (sim, nodes)
}

/// A standalone tree, log and index fed by locally built actions.
pub struct ReplicaFixture {
    pub tree: SyncTree,
    pub log: ActionLog,
    pub index: ObjectIndex,
}

impl ReplicaFixture {
    pub fn new() -> Self {
        let tree = SyncTree::new();
        let log = ActionLog::new(tree.root());
        Self {
            tree,
            log,
            index: ObjectIndex::new(),
        }
    }

    /// Apply an action the way the engine does. Returns whether it changed
    /// the tree.
    pub fn apply(&mut self, action: &ActionEntry) -> bool {
        let Some(root) = self.tree.update(action.creator(), action.seq()) else {
            return false;
        };
        self.index.apply(action, true);
        self.log.push(root, action.clone());
        true
    }

    /// Build and apply the next action of `creator`.
    pub fn act(&mut self, creator: &str, kind: ActionKind, target: &str) -> ActionEntry {
        let creator = name(creator);
        let target = name(target);
        let seq = self.tree.last_seq(&creator) + 1;
        let version = self.index.next_version(&target, kind);
        let action = ActionEntry::new(creator, seq, kind, target, version);
        self.apply(&action);
        action
    }
}

impl Default for ReplicaFixture {
    fn default() -> Self {
        Self::new()
    }
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

pub fn secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}
