//! Pending SYNC requests from peers.
//!
//! A peer's SYNC request that cannot be answered yet is parked here: either
//! its digest equals our root (nothing to tell it until our root moves), or
//! its digest is unknown and we are waiting to see whether in-flight actions
//! explain it. Entries are keyed by request name, so a repeated request
//! refreshes the existing entry, and they expire after a fixed lifetime.

use std::collections::BTreeMap;
use std::time::Duration;

use repo_sync_core::{DigestValue, Name};

/// One parked SYNC request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub name: Name,
    pub digest: DigestValue,
    /// The digest was not recognised when the request arrived.
    pub unknown: bool,
    pub expires_at: Duration,
}

/// Deduplicating table of parked SYNC requests.
#[derive(Debug, Clone)]
pub struct PendingRequestTable {
    lifetime: Duration,
    entries: BTreeMap<Name, PendingRequest>,
}

impl PendingRequestTable {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            entries: BTreeMap::new(),
        }
    }

    /// Park a request. Returns `true` if an entry with the same name was
    /// already parked (it is replaced and its lifetime restarted).
    pub fn insert(&mut self, now: Duration, name: Name, digest: DigestValue, unknown: bool) -> bool {
        self.expire(now);
        let entry = PendingRequest {
            name: name.clone(),
            digest,
            unknown,
            expires_at: now + self.lifetime,
        };
        self.entries.insert(name, entry).is_some()
    }

    /// Remove the entry for `name`, if any.
    pub fn remove(&mut self, name: &Name) -> Option<PendingRequest> {
        self.entries.remove(name)
    }

    /// Drop expired entries. Returns how many were dropped.
    pub fn expire(&mut self, now: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before - self.entries.len()
    }

    /// Remove and return every live entry for which `select` holds, in name
    /// order. Entries not selected stay parked.
    pub fn take_where<F>(&mut self, now: Duration, mut select: F) -> Vec<PendingRequest>
    where
        F: FnMut(&PendingRequest) -> bool,
    {
        self.expire(now);
        let names: Vec<Name> = self
            .entries
            .values()
            .filter(|e| select(e))
            .map(|e| e.name.clone())
            .collect();
        names
            .iter()
            .filter_map(|name| self.entries.remove(name))
            .collect()
    }

    /// Whether any live entry carries `digest`.
    pub fn contains_digest(&self, digest: &DigestValue) -> bool {
        self.entries.values().any(|e| &e.digest == digest)
    }

    pub fn get(&self, name: &Name) -> Option<&PendingRequest> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
