//! Error types for repo-sync core primitives.

use thiserror::Error;

/// Errors raised by digests, names and wire values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("digest is finalized")]
    DigestFinalized,

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("unknown action kind: {0}")]
    UnknownActionKind(u64),

    #[error("unknown object status: {0}")]
    UnknownStatus(u64),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
