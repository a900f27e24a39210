//! # repo-sync testkit
//!
//! Testing utilities for repo-sync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Simulation**: A deterministic, virtual-clock mesh of sync engines
//! - **Generators**: Proptest strategies for names, creators and action histories
//! - **Fixtures**: Helpers for setting up nodes and standalone replicas
//!
//! ## Simulation
//!
//! ```rust
//! use repo_sync_testkit::fixtures::{mesh, name, secs};
//!
//! let (mut sim, nodes) = mesh(2);
//! sim.insert(&nodes[0], name("/x")).unwrap();
//! let converged_at = sim.run_until_converged(secs(60)).unwrap();
//! assert!(converged_at.is_some());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use repo_sync_testkit::generators::action_history;
//!
//! proptest! {
//!     #[test]
//!     fn replay_is_idempotent(actions in action_history(20)) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod sim;

pub use fixtures::{config, mesh, ReplicaFixture};
pub use generators::{action_history, actions_from_params, MutationParams};
pub use sim::{RoutedOp, SimEngine, Simulation};
