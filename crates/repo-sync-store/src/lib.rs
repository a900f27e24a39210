//! # repo-sync store
//!
//! In-memory state tables owned by one sync engine.
//!
//! ## Key Types
//!
//! - [`SyncTree`] - Per-creator high-water marks and the root digest
//! - [`ActionLog`] - Digest-indexed action history since the last compaction
//! - [`DigestLog`] - Bounded history of roots, kept across compactions
//! - [`ObjectIndex`] - Object status table
//! - [`Snapshot`] - Compacted checkpoint of index and tree
//!
//! ## Design Notes
//!
//! - **Idempotent updates**: tree updates with `seq <= last_seq` are no-ops
//! - **Deterministic root**: the root depends only on `{creator -> last_seq}`
//! - **Sticky tombstones**: stale `Existed` replays never undo a deletion
//!
//! Nothing here is shared between nodes and nothing is locked; the owning
//! engine serializes every mutation.

pub mod index;
pub mod log;
pub mod snapshot;
pub mod tree;

pub use index::{ObjectIndex, StatusChange};
pub use log::{ActionLog, DigestLog, LogRecord};
pub use snapshot::{SeenSnapshots, Snapshot, SnapshotKey};
pub use tree::{empty_root, SyncTree, TreeEntry};
