//! # repo-sync protocol
//!
//! Leaderless state synchronization over a pull-based named-content
//! transport.
//!
//! ## Overview
//!
//! Every repository keeps a digest tree over `{creator -> last_seq}`. Nodes
//! keep one SYNC request for their current root outstanding. A node that
//! recognises the digest in its action log answers with the diff; the
//! requester then fetches the named actions through a bounded per-creator
//! pipeline and applies them in order. Digests nobody can explain trigger
//! RECOVERY, which is answered with a full creator table. After a quiet
//! period in agreement the log is compacted into a snapshot that is served
//! in place of compacted actions.
//!
//! ## Driving the engine
//!
//! [`SyncEngine`] is sans-IO. The caller supplies the current time with
//! every call:
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use repo_sync_core::Name;
//! use repo_sync_protocol::{memory::RecordingTransport, SyncConfig, SyncEngine};
//!
//! # fn main() -> repo_sync_protocol::Result<()> {
//! let config = SyncConfig::for_creator("/repo/a");
//! let mut engine = SyncEngine::new(config, RecordingTransport::new())?;
//! engine.start(Duration::ZERO)?;
//! engine.insert(Duration::from_millis(5), Name::parse("/x")?)?;
//! if let Some(deadline) = engine.next_deadline() {
//!     engine.fire_timers(deadline)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Node A                                   Node B
//!   |-------- sync/<rootA> ----------------->|   (B recognises rootA)
//!   |<------- [ (B,7) (B,8) ] ---------------|
//!   |-------- fetch/B/7, fetch/B/8 --------->|
//!   |<------- action B/7, action B/8 --------|
//!   |-------- sync/<rootA'> ---------------->|   (fast path)
//! ```

pub mod codec;
pub mod config;
pub mod convergence;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod messages;
pub mod namespace;
pub mod pending;
pub mod timer;
pub mod transport;

pub use config::{DelayRange, SyncConfig};
pub use convergence::{compute_index_hash, verify_all, verify_convergence, ConvergenceResult};
pub use engine::{AgreementState, EngineStats, SyncEngine, TimerLabel};
pub use error::{Result, SyncError};
pub use fetch::{FetchPipelines, FetchPlan, PipelineState, Received, RetryBudget};
pub use messages::{advertisements, Advertisement, MessageType, SyncMessage};
pub use namespace::SyncRequest;
pub use pending::{PendingRequest, PendingRequestTable};
pub use timer::TimerQueue;
pub use transport::{memory, Inbound, Transport, TransportOp};
