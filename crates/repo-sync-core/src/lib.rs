//! # repo-sync core
//!
//! Pure primitives for the repo-sync protocol: digests, hierarchical names,
//! actions and object status.
//!
//! This crate contains no I/O, no timers, no networking.
//!
//! ## Key Types
//!
//! - [`Digest`] / [`DigestValue`] - Order-sensitive, finalize-once fingerprint
//! - [`Name`] - Hierarchical `/`-separated name
//! - [`ActionEntry`] - One immutable insert/delete mutation
//! - [`ActionName`] - The (creator, seq) identity of an action
//! - [`ObjectStatus`] - What a repository knows about one object

pub mod action;
pub mod digest;
pub mod error;
pub mod name;
pub mod status;

pub use action::{ActionEntry, ActionKind, ActionName};
pub use digest::{Digest, DigestValue};
pub use error::{CoreError, Result};
pub use name::Name;
pub use status::{ObjectStatus, SnapshotMerge};
