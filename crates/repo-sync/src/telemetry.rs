//! Tracing setup.

use tracing_subscriber::EnvFilter;

use crate::error::{RepoError, Result};

/// Install a global `fmt` subscriber filtered by `filter`.
///
/// `RUST_LOG`, when set, takes precedence over `filter`. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter).map_err(|e| RepoError::Telemetry(e.to_string()))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| RepoError::Telemetry(e.to_string()))
}

/// Like [`init_tracing`], writing through the test harness's capture.
/// Repeated calls are ignored.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("repo_sync=debug"))
        .with_test_writer()
        .try_init();
}
