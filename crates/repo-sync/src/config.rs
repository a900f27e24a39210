//! Node configuration loaded from JSON.
//!
//! ```json
//! {
//!   "log_filter": "repo_sync=debug",
//!   "sync": { "creator": "/repo/a", "heartbeat_ms": 4000 }
//! }
//! ```
//!
//! Missing fields take their defaults.

use std::path::Path;

use repo_sync_protocol::SyncConfig;
use serde::{Deserialize, Serialize};

use crate::error::{RepoError, Result};

/// Everything needed to run one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Engine settings.
    pub sync: SyncConfig,
    /// `EnvFilter` directive used by [`crate::telemetry::init_tracing`].
    pub log_filter: String,
    /// Capacity of the node's event inbox.
    pub inbox_capacity: usize,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            log_filter: "info".into(),
            inbox_capacity: 1024,
        }
    }
}

impl RepoConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RepoConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        if self.inbox_capacity == 0 {
            return Err(RepoError::InvalidConfig("inbox_capacity must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_from_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "sync": {{ "creator": "/repo/b", "pipeline_window": 20, "heartbeat_ms": 2000 }} }}"#
        )
        .unwrap();

        let config = RepoConfig::from_file(file.path()).unwrap();
        assert_eq!(config.sync.creator, "/repo/b");
        assert_eq!(config.sync.pipeline_window, 20);
        assert_eq!(config.sync.heartbeat, Duration::from_secs(2));
        assert_eq!(config.sync.compaction_hold, Duration::from_secs(20));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_json_roundtrip() {
        let config = RepoConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(RepoConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_sync_config_rejected() {
        let err = RepoConfig::from_json(r#"{ "sync": { "pipeline_window": 0 } }"#).unwrap_err();
        assert!(matches!(err, RepoError::Sync(_)));
    }

    #[test]
    fn test_bad_json_and_missing_file() {
        assert!(matches!(
            RepoConfig::from_json("{ not json"),
            Err(RepoError::ConfigParse(_))
        ));
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RepoConfig::from_file(dir.path().join("absent.json")),
            Err(RepoError::Io(_))
        ));
    }

    #[test]
    fn test_zero_inbox_rejected() {
        let err = RepoConfig::from_json(r#"{ "inbox_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, RepoError::InvalidConfig(_)));
    }
}
