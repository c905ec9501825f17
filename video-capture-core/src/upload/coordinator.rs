use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::config::{StorageLayout, UploadConfig};
use crate::models::error::CaptureError;
use crate::models::upload_task::UploadOutcome;
use crate::monitor::connectivity::ConnectivityMonitor;
use crate::monitor::retention::{ReclaimOutcome, RetentionManager};
use crate::storage::progress_store::ProgressStore;
use crate::storage::shard_directory::{list_shards, ShardEntry};
use crate::traits::upload_transport::{CredentialStore, UploadTransport};
use crate::upload::registry::{WorkerRegistry, WorkerResult};
use crate::upload::worker::UploadWorker;

const PAUSE_SLICE: Duration = Duration::from_millis(250);

/// What one watcher cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub reclaimed: Vec<PathBuf>,
    pub reaped: Vec<PathBuf>,
    pub admitted: Vec<PathBuf>,
}

/// The watcher loop: keeps space free, then feeds eligible shards to a
/// bounded pool of upload workers.
pub struct UploadCoordinator {
    layout: StorageLayout,
    config: UploadConfig,
    retention: RetentionManager,
    connectivity: ConnectivityMonitor,
    transport: Arc<dyn UploadTransport>,
    progress: ProgressStore,
    registry: WorkerRegistry,
    running: Arc<AtomicBool>,
}

impl UploadCoordinator {
    pub fn new(
        layout: StorageLayout,
        config: UploadConfig,
        retention: RetentionManager,
        connectivity: ConnectivityMonitor,
        transport: Arc<dyn UploadTransport>,
    ) -> Self {
        let progress = ProgressStore::new(layout.uploads_dir.clone());
        Self {
            layout,
            config,
            retention,
            connectivity,
            transport,
            progress,
            registry: WorkerRegistry::new(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Share a shutdown flag with the caller; clearing it ends `run`.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Cycle until shutdown, then wait for in-flight workers. Workers share
    /// the shutdown flag and stop after their current chunk.
    ///
    /// Only a deletion failure under the `Abort` policy ends the loop early.
    pub fn run(&mut self) -> Result<(), CaptureError> {
        log::info!("Watcher started for {}", self.layout.video_dir.display());
        let result = self.cycle_until_stopped();

        if !self.registry.is_empty() {
            log::info!("Waiting for {} upload worker(s) to finish", self.registry.len());
        }
        self.wait_idle();
        log::info!("Watcher stopped");
        result
    }

    fn cycle_until_stopped(&mut self) -> Result<(), CaptureError> {
        while self.running.load(Ordering::SeqCst) {
            self.run_cycle()?;
            self.pause(self.config.cycle_interval);
        }
        Ok(())
    }

    /// One pass: reclaim space, reap finished workers, admit new uploads.
    pub fn run_cycle(&mut self) -> Result<CycleReport, CaptureError> {
        let reclaimed = self.make_room()?;
        let reaped = self.reap();
        let admitted = if self.connectivity.is_connected() {
            self.admit_eligible()
        } else {
            Vec::new()
        };

        if !self.registry.is_empty() {
            log::debug!("Uploads in flight: {:?}", self.registry.paths());
        }
        Ok(CycleReport {
            reclaimed,
            reaped,
            admitted,
        })
    }

    /// Join every worker, logging each outcome.
    pub fn wait_idle(&mut self) -> Vec<PathBuf> {
        self.registry
            .wait_idle()
            .into_iter()
            .map(|(path, result)| log_result(path, result))
            .collect()
    }

    fn make_room(&mut self) -> Result<Vec<PathBuf>, CaptureError> {
        let mut reclaimed = Vec::new();
        while !self.retention.has_enough_space() {
            match self.retention.reclaim_oldest()? {
                ReclaimOutcome::Reclaimed(path) => {
                    reclaimed.push(path);
                    thread::sleep(self.retention.config().reclaim_pause);
                }
                ReclaimOutcome::Exhausted => break,
            }
        }
        Ok(reclaimed)
    }

    fn reap(&mut self) -> Vec<PathBuf> {
        self.registry
            .reap()
            .into_iter()
            .map(|(path, result)| log_result(path, result))
            .collect()
    }

    fn admit_eligible(&mut self) -> Vec<PathBuf> {
        let shards = match list_shards(&self.layout.video_dir) {
            Ok(shards) => shards,
            Err(e) => {
                log::error!("Cannot scan for shards to upload: {}", e);
                return Vec::new();
            }
        };

        let mut admitted = Vec::new();
        for shard in shards {
            if self.registry.len() >= self.config.max_workers {
                break;
            }
            if self.registry.contains(&shard.path) {
                continue;
            }
            let size = shard.size();
            if size < self.config.min_shard_bytes {
                log::debug!("{} is only {} bytes, leaving it for now", shard.name, size);
                continue;
            }

            match self.spawn_worker(shard) {
                Ok(Some(path)) => admitted.push(path),
                Ok(None) => {}
                Err(e) => log::error!("{}", e),
            }
        }
        admitted
    }

    fn spawn_worker(&mut self, shard: ShardEntry) -> Result<Option<PathBuf>, CaptureError> {
        let path = shard.path.clone();
        let thread_name = format!("upload:{}", shard.name);
        let worker = UploadWorker::new(
            shard.path,
            shard.name,
            Arc::clone(&self.transport),
            self.progress.clone(),
            CredentialStore::new(self.layout.credentials_path.clone()),
            self.config.clone(),
        )
        .with_running_flag(Arc::clone(&self.running));

        let spawned = self.registry.admit(path.clone(), move || {
            thread::Builder::new().name(thread_name).spawn(move || worker.run())
        })?;
        if spawned {
            log::info!("Queued {} for upload", path.display());
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }

    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(PAUSE_SLICE));
        }
    }
}

fn log_result(path: PathBuf, result: WorkerResult) -> PathBuf {
    match result {
        Ok(UploadOutcome::Completed { .. }) => {
            log::debug!("Upload worker for {} completed", path.display())
        }
        Ok(UploadOutcome::Unreachable { offset }) => log::info!(
            "Upload of {} paused at byte {} until the network returns",
            path.display(),
            offset
        ),
        Ok(UploadOutcome::Interrupted { offset }) => log::info!(
            "Upload of {} stopped at byte {} for shutdown",
            path.display(),
            offset
        ),
        Ok(outcome) => log::info!("Upload worker for {} ended: {:?}", path.display(), outcome),
        Err(panic) => log::error!("Upload worker for {} crashed: {}", path.display(), panic),
    }
    path
}
