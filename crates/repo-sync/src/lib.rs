//! # repo-sync
//!
//! Async runtime for the repo-sync protocol: leaderless replication of an
//! object repository's insert/delete history between peers.
//!
//! ## Overview
//!
//! - [`RepoNode`] runs one [`SyncEngine`](protocol::SyncEngine) inside a
//!   tokio task and serves its timers
//! - [`NodeHandle`] issues local inserts and deletes and inspects the node
//! - [`MemoryHub`] routes traffic between nodes living in one process
//! - [`RepoConfig`] loads node settings from JSON
//!
//! ## Usage
//!
//! ```rust,no_run
//! use repo_sync::{core::Name, MemoryHub, RepoConfig};
//!
//! # async fn example() -> repo_sync::Result<()> {
//! let config = RepoConfig::from_file("node-a.json")?;
//! repo_sync::telemetry::init_tracing(&config.log_filter)?;
//!
//! let mut hub = MemoryHub::with_inbox_capacity(config.inbox_capacity);
//! let (node, handle) = hub.add_node(config.sync)?;
//! tokio::spawn(node.run());
//! tokio::spawn(hub.run());
//!
//! handle.insert(Name::parse("/photos/1").map_err(repo_sync::protocol::SyncError::from)?).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Re-exports
//!
//! - `repo_sync::core` - Names, digests, actions, object status
//! - `repo_sync::store` - Sync tree, logs, object index, snapshots
//! - `repo_sync::protocol` - Sans-IO engine and transport abstraction

pub mod config;
pub mod error;
pub mod hub;
pub mod node;
pub mod telemetry;

pub use repo_sync_core as core;
pub use repo_sync_protocol as protocol;
pub use repo_sync_store as store;

pub use config::RepoConfig;
pub use error::{RepoError, Result};
pub use hub::MemoryHub;
pub use node::{ChannelTransport, NodeHandle, NodeReport, Outbound, RepoNode};
