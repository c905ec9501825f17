use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;

use crate::models::config::{DeletionFailurePolicy, RetentionConfig};
use crate::models::error::CaptureError;
use crate::monitor::throttle::Throttle;
use crate::storage::progress_store::ProgressStore;
use crate::storage::shard_directory::{list_shards, ShardEntry};
use crate::traits::disk_usage::DiskUsage;

/// Result of one eviction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimOutcome {
    /// The named shard is gone.
    Reclaimed(PathBuf),

    /// Nothing could be evicted; the caller has already been held back by
    /// the exhaustion back-off.
    Exhausted,
}

/// Keeps the shard directory under the disk watermark by evicting the
/// oldest shards first.
pub struct RetentionManager {
    video_dir: PathBuf,
    progress: ProgressStore,
    config: RetentionConfig,
    usage: Box<dyn DiskUsage>,
    space: Throttle<bool>,
}

impl RetentionManager {
    pub fn new(
        video_dir: impl Into<PathBuf>,
        progress: ProgressStore,
        config: RetentionConfig,
        usage: Box<dyn DiskUsage>,
    ) -> Self {
        let space = Throttle::new(config.check_interval);
        Self {
            video_dir: video_dir.into(),
            progress,
            config,
            usage,
            space,
        }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Whether at least `required_free_percent` of the disk is free.
    ///
    /// Probes at most once per check interval and returns the cached answer
    /// in between. A successful eviction clears the cache.
    pub fn has_enough_space(&self) -> bool {
        self.space.get_or_refresh(|| self.probe_space())
    }

    fn probe_space(&self) -> bool {
        match self.usage.used_percent() {
            Ok(used) => {
                let enough = u16::from(used) + u16::from(self.config.required_free_percent) <= 100;
                log::debug!("{}% of disk space used. Enough: {}", used, enough);
                enough
            }
            Err(e) => {
                // Without numbers, never evict blindly.
                log::warn!("Unable to measure disk usage of {}: {}", self.video_dir.display(), e);
                true
            }
        }
    }

    /// Delete the single oldest shard.
    ///
    /// Returns `Err` only when a deletion failed and the configured policy is
    /// `Abort`. When there is nothing to evict this logs, sleeps the
    /// exhaustion back-off and returns `Exhausted`.
    pub fn reclaim_oldest(&self) -> Result<ReclaimOutcome, CaptureError> {
        let shards = match list_shards(&self.video_dir) {
            Ok(shards) => shards,
            Err(e) => {
                log::error!("Cannot scan for shards to reclaim: {}", e);
                Vec::new()
            }
        };

        let candidates = if self.config.protect_newest_shard {
            &shards[..shards.len().saturating_sub(1)]
        } else {
            &shards[..]
        };

        for shard in candidates {
            match fs::remove_file(&shard.path) {
                Ok(()) => {
                    log::info!("Removing oldest video: {}", shard.name);
                    self.forget(shard);
                    return Ok(ReclaimOutcome::Reclaimed(shard.path.clone()));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // An upload worker finished it first; space was freed either way.
                    log::debug!("{} vanished before it could be reclaimed", shard.name);
                    self.forget(shard);
                    return Ok(ReclaimOutcome::Reclaimed(shard.path.clone()));
                }
                Err(e) => self.handle_deletion_failure(&shard.path, e)?,
            }
        }

        log::error!(
            "No videos in directory {} can be reclaimed, cannot make room",
            self.video_dir.display()
        );
        thread::sleep(self.config.exhaustion_backoff);
        Ok(ReclaimOutcome::Exhausted)
    }

    fn forget(&self, shard: &ShardEntry) {
        if let Err(e) = self.progress.remove(shard.name.file_name()) {
            log::warn!("Failed to remove upload progress of {}: {}", shard.name, e);
        }
        self.space.invalidate();
    }

    fn handle_deletion_failure(&self, path: &Path, err: io::Error) -> Result<(), CaptureError> {
        let error = if err.kind() == io::ErrorKind::PermissionDenied {
            CaptureError::PermissionDenied {
                path: path.to_path_buf(),
                reason: err.to_string(),
            }
        } else {
            CaptureError::StorageError(format!("failed to delete {}: {}", path.display(), err))
        };

        match self.config.deletion_failure_policy {
            DeletionFailurePolicy::Abort => {
                log::error!("{}; watcher must run as the shard owner", error);
                Err(error)
            }
            DeletionFailurePolicy::SkipAndContinue => {
                log::error!("{}; skipping to the next oldest shard", error);
                Ok(())
            }
        }
    }
}
