//! Error types for the sync protocol.

use thiserror::Error;

/// Errors that can occur while encoding, decoding or driving the protocol.
///
/// Decode and validation errors are message-scoped: the engine logs them and
/// drops the offending message without touching local state.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A required field was missing or had the wrong type.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A request under the sync prefix with an unknown type component.
    #[error("unsupported request: {0}")]
    UnsupportedRequest(String),

    /// A well-formed message arrived where a different kind was expected.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// A fetch was retried too often and has been abandoned.
    #[error("fetch of {name} abandoned after {attempts} attempts")]
    FetchRetryExhausted { name: String, attempts: u32 },

    /// A delete was requested on an engine that does not model deletions.
    #[error("deletions are disabled for this repository")]
    DeletionDisabled,

    /// Configuration failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Name, digest or other core value error.
    #[error(transparent)]
    Core(#[from] repo_sync_core::CoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
