//! Engine configuration.
//!
//! Every timing knob is a `Duration`; in serialized form durations are
//! integer milliseconds so config files stay readable.

use std::time::Duration;

use rand::Rng;
use repo_sync_core::Name;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|v| v.map(Duration::from_millis))
    }
}

/// Inclusive range a random delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    #[serde(rename = "min_ms", with = "millis")]
    pub min: Duration,
    #[serde(rename = "max_ms", with = "millis")]
    pub max: Duration,
}

impl DelayRange {
    pub const fn from_millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    /// Draw a delay uniformly, at millisecond granularity.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

/// Configuration for one sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// This repository's creator name.
    pub creator: String,
    /// Shared prefix every node listens on for sync traffic.
    pub sync_prefix: String,
    /// Prefix under which object content is requested.
    pub data_prefix: String,

    /// Period of the own SYNC heartbeat.
    #[serde(rename = "heartbeat_ms", with = "millis")]
    pub heartbeat: Duration,
    pub heartbeat_jitter: DelayRange,
    /// How long a SYNC with an unrecognised digest waits before recovery.
    pub unknown_digest_wait: DelayRange,
    #[serde(rename = "recovery_backoff_start_ms", with = "millis")]
    pub recovery_backoff_start: Duration,
    /// The recovery timer is not re-armed once the backoff reaches this.
    #[serde(rename = "recovery_backoff_cap_ms", with = "millis")]
    pub recovery_backoff_cap: Duration,
    pub recovery_jitter: DelayRange,
    /// Time spent synchronized before the log is compacted.
    #[serde(rename = "compaction_hold_ms", with = "millis")]
    pub compaction_hold: Duration,
    /// Lifetime of every outgoing request.
    #[serde(rename = "request_lifetime_ms", with = "millis")]
    pub request_lifetime: Duration,
    #[serde(rename = "response_freshness_ms", with = "millis")]
    pub response_freshness: Duration,
    /// How long a consumed snapshot is remembered.
    #[serde(rename = "snapshot_memory_ms", with = "millis")]
    pub snapshot_memory: Duration,
    /// How long a parked SYNC request is kept.
    #[serde(rename = "pending_lifetime_ms", with = "millis")]
    pub pending_lifetime: Duration,

    /// Maximum fetches in flight ahead of the applied seq, per creator.
    pub pipeline_window: u64,
    pub fetch_retry_limit: u32,
    /// Whether Delete actions change object status.
    pub model_deletions: bool,
    #[serde(rename = "tombstone_purge_interval_ms", with = "opt_millis")]
    pub tombstone_purge_interval: Option<Duration>,
    /// Bound on remembered root digests. `None` keeps every root.
    pub digest_history_limit: Option<usize>,
    /// Seed for timer jitter. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            creator: "/repo/a".into(),
            sync_prefix: "/ndn/broadcast".into(),
            data_prefix: "/data".into(),
            heartbeat: Duration::from_secs(4),
            heartbeat_jitter: DelayRange::from_millis(100, 500),
            unknown_digest_wait: DelayRange::from_millis(200, 1000),
            recovery_backoff_start: Duration::from_millis(200),
            recovery_backoff_cap: Duration::from_secs(100),
            recovery_jitter: DelayRange::from_millis(100, 500),
            compaction_hold: Duration::from_secs(20),
            request_lifetime: Duration::from_secs(5),
            response_freshness: Duration::from_secs(1),
            snapshot_memory: Duration::from_secs(10),
            pending_lifetime: Duration::from_secs(4),
            pipeline_window: 12,
            fetch_retry_limit: 4,
            model_deletions: true,
            tombstone_purge_interval: None,
            digest_history_limit: None,
            rng_seed: None,
        }
    }
}

impl SyncConfig {
    /// Default configuration for `creator`.
    pub fn for_creator(creator: impl Into<String>) -> Self {
        Self {
            creator: creator.into(),
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn creator_name(&self) -> Result<Name> {
        parse_prefix("creator", &self.creator)
    }

    pub fn sync_prefix_name(&self) -> Result<Name> {
        parse_prefix("sync_prefix", &self.sync_prefix)
    }

    pub fn data_prefix_name(&self) -> Result<Name> {
        parse_prefix("data_prefix", &self.data_prefix)
    }

    /// Check names and knobs for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let creator = self.creator_name()?;
        let sync_prefix = self.sync_prefix_name()?;
        let data_prefix = self.data_prefix_name()?;
        if sync_prefix.is_prefix_of(&data_prefix) || data_prefix.is_prefix_of(&sync_prefix) {
            return Err(SyncError::InvalidConfig(format!(
                "sync prefix {sync_prefix} and data prefix {data_prefix} overlap"
            )));
        }
        if sync_prefix.is_prefix_of(&creator) {
            return Err(SyncError::InvalidConfig(format!(
                "creator {creator} lives under the sync prefix"
            )));
        }
        if self.pipeline_window == 0 {
            return Err(SyncError::InvalidConfig("pipeline_window must be > 0".into()));
        }
        if self.fetch_retry_limit == 0 {
            return Err(SyncError::InvalidConfig("fetch_retry_limit must be > 0".into()));
        }
        if self.heartbeat.is_zero() || self.request_lifetime.is_zero() {
            return Err(SyncError::InvalidConfig(
                "heartbeat and request_lifetime must be non-zero".into(),
            ));
        }
        if self.recovery_backoff_start.is_zero()
            || self.recovery_backoff_start > self.recovery_backoff_cap
        {
            return Err(SyncError::InvalidConfig(
                "recovery backoff must start above zero and below its cap".into(),
            ));
        }
        if self.digest_history_limit == Some(0) {
            return Err(SyncError::InvalidConfig(
                "digest_history_limit must be > 0 when set".into(),
            ));
        }
        for (field, range) in [
            ("heartbeat_jitter", self.heartbeat_jitter),
            ("unknown_digest_wait", self.unknown_digest_wait),
            ("recovery_jitter", self.recovery_jitter),
        ] {
            if range.min > range.max {
                return Err(SyncError::InvalidConfig(format!("{field}: min exceeds max")));
            }
        }
        Ok(())
    }
}

fn parse_prefix(field: &str, uri: &str) -> Result<Name> {
    let name = Name::parse(uri)
        .map_err(|e| SyncError::InvalidConfig(format!("{field}: {e}")))?;
    if name.is_empty() {
        return Err(SyncError::InvalidConfig(format!("{field} must not be the root name")));
    }
    Ok(name)
}
