//! Error types for the repo-sync facade.

use repo_sync_protocol::SyncError;
use thiserror::Error;

/// Errors that can occur while configuring or running a node.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Protocol error, including config validation.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Config file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for [`crate::RepoConfig`].
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Invalid value in the facade's own settings.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The node task has exited.
    #[error("node stopped")]
    NodeStopped,

    /// A node with this creator is already attached to the hub.
    #[error("duplicate node: {0}")]
    DuplicateNode(String),

    /// The tracing subscriber could not be installed.
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

/// Result type for repo-sync operations.
pub type Result<T> = std::result::Result<T, RepoError>;
