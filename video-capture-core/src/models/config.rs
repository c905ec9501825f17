use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where shards, progress records and credentials live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageLayout {
    /// Directory holding shard files (`{session}.{index}.{format}`).
    pub video_dir: PathBuf,

    /// Directory holding one `{shard}.json` progress record per in-flight upload.
    pub uploads_dir: PathBuf,

    /// Pre-provisioned credential blob read at the start of every upload attempt.
    pub credentials_path: PathBuf,

    /// Container extension used for shard names (default: `h264`).
    pub format: String,

    /// Zero-padding width of the sequence index (default: 3).
    pub index_width: usize,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            video_dir: PathBuf::from("video"),
            uploads_dir: PathBuf::from("uploads"),
            credentials_path: PathBuf::from(".credentials"),
            format: "h264".into(),
            index_width: 3,
        }
    }
}

/// Recorder tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// How often buffered data is flushed into the current shard (default: 5s).
    #[serde(with = "duration_secs")]
    pub flush_interval: Duration,

    /// Shard size above which the next split opens a new shard (default: 5 GB).
    pub max_shard_bytes: u64,

    /// Sessions made of one fresh shard shorter than this many flush
    /// intervals are discarded on reconnect (default: 12).
    pub min_session_intervals: u32,

    /// Poll period while waiting for connectivity to drop (default: 5s).
    #[serde(with = "duration_secs")]
    pub idle_poll_interval: Duration,

    /// Delay before restarting after a clock hazard or driver failure (default: 10s).
    #[serde(with = "duration_secs")]
    pub restart_backoff: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(5),
            max_shard_bytes: 5_000_000_000,
            min_session_intervals: 12,
            idle_poll_interval: Duration::from_secs(5),
            restart_backoff: Duration::from_secs(10),
        }
    }
}

/// What the retention manager does when a shard cannot be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionFailurePolicy {
    /// Stop the watcher loop with `CaptureError::PermissionDenied`.
    Abort,
    /// Log and try the next-oldest shard.
    SkipAndContinue,
}

/// Disk watermark tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Percentage of the disk that must stay free (default: 15).
    pub required_free_percent: u8,

    /// Space probes are rate limited to one per interval (default: 30s).
    #[serde(with = "duration_secs")]
    pub check_interval: Duration,

    /// Pause between consecutive evictions in one cycle (default: 1s).
    #[serde(with = "duration_secs")]
    pub reclaim_pause: Duration,

    /// Back-off when space is short but nothing can be evicted (default: 30s).
    #[serde(with = "duration_secs")]
    pub exhaustion_backoff: Duration,

    pub deletion_failure_policy: DeletionFailurePolicy,

    /// Never evict the newest shard, which may still be written (default: true).
    pub protect_newest_shard: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            required_free_percent: 15,
            check_interval: Duration::from_secs(30),
            reclaim_pause: Duration::from_secs(1),
            exhaustion_backoff: Duration::from_secs(30),
            deletion_failure_policy: DeletionFailurePolicy::SkipAndContinue,
            protect_newest_shard: true,
        }
    }
}

/// Reachability probe tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    pub host: String,
    pub port: u16,

    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Probes are rate limited to one per window (default: 5s).
    #[serde(with = "duration_secs")]
    pub throttle: Duration,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            host: "8.8.8.8".into(),
            port: 53,
            timeout: Duration::from_secs(1),
            throttle: Duration::from_secs(5),
        }
    }
}

/// Upload pipeline tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Bytes per resumable chunk (default: 50 MB).
    pub chunk_size: u64,

    /// Maximum concurrent upload workers (default: 1).
    pub max_workers: usize,

    /// Shards smaller than this are presumed still being written (default: 50 MB).
    pub min_shard_bytes: u64,

    /// Watcher sleep between cycles (default: 30s).
    #[serde(with = "duration_secs")]
    pub cycle_interval: Duration,

    /// Extra attempts per chunk on retryable remote errors (default: 3).
    pub chunk_retries: u32,

    #[serde(with = "duration_secs")]
    pub retry_pause: Duration,

    pub title_prefix: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50_000_000,
            max_workers: 1,
            min_shard_bytes: 50_000_000,
            cycle_interval: Duration::from_secs(30),
            chunk_retries: 3,
            retry_pause: Duration::from_secs(2),
            title_prefix: "Helmet Camera".into(),
            tags: vec!["helmet".into()],
            category_id: "2".into(),
            privacy_status: "unlisted".into(),
        }
    }
}

/// Complete configuration for the recorder and the watcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    pub storage: StorageLayout,
    pub recorder: RecorderConfig,
    pub retention: RetentionConfig,
    pub connectivity: ConnectivityConfig,
    pub upload: UploadConfig,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.storage.format.is_empty() || self.storage.format.contains('.') {
            return Err(format!("invalid shard format: {:?}", self.storage.format));
        }
        if self.storage.index_width == 0 {
            return Err("index width must be positive".into());
        }
        if self.storage.video_dir == self.storage.uploads_dir {
            return Err("video and uploads directories must differ".into());
        }
        if self.recorder.flush_interval.is_zero() {
            return Err("flush interval must be positive".into());
        }
        if self.recorder.max_shard_bytes == 0 {
            return Err("max shard size must be positive".into());
        }
        if self.retention.required_free_percent > 100 {
            return Err(format!(
                "required free percent out of range: {}",
                self.retention.required_free_percent
            ));
        }
        if self.upload.chunk_size == 0 {
            return Err("upload chunk size must be positive".into());
        }
        if self.upload.max_workers == 0 {
            return Err("at least one upload worker is required".into());
        }
        Ok(())
    }
}

/// Durations are written as (possibly fractional) seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(CaptureConfiguration::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_workers() {
        let mut config = CaptureConfiguration::default();
        config.upload.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_shared_directories() {
        let mut config = CaptureConfiguration::default();
        config.storage.uploads_dir = config.storage.video_dir.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: CaptureConfiguration = serde_json::from_str(
            r#"{"recorder": {"max_shard_bytes": 500000000, "flush_interval": 0.5},
                "retention": {"deletion_failure_policy": "abort"}}"#,
        )
        .unwrap();

        assert_eq!(config.recorder.max_shard_bytes, 500_000_000);
        assert_eq!(config.recorder.flush_interval, Duration::from_millis(500));
        assert_eq!(config.recorder.min_session_intervals, 12);
        assert_eq!(config.retention.deletion_failure_policy, DeletionFailurePolicy::Abort);
        assert_eq!(config.upload, UploadConfig::default());
    }
}
