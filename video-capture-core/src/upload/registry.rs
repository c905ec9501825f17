use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crate::models::error::CaptureError;
use crate::models::upload_task::UploadOutcome;

/// Join handle of one upload worker thread.
pub type WorkerHandle = JoinHandle<UploadOutcome>;

/// A reaped worker: its outcome, or the panic message if it crashed.
pub type WorkerResult = Result<UploadOutcome, String>;

/// Live upload workers, keyed by shard path.
///
/// Owned by the coordinator; used for liveness, reaping and to avoid
/// admitting the same shard twice. It says nothing about other processes.
#[derive(Default)]
pub struct WorkerRegistry {
    active: BTreeMap<PathBuf, WorkerHandle>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn contains(&self, shard: &Path) -> bool {
        self.active.contains_key(shard)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.active.keys().cloned().collect()
    }

    /// Spawn a worker for `shard` unless one is already registered.
    ///
    /// Returns `Ok(false)` without calling `spawn` for a duplicate.
    pub fn admit(
        &mut self,
        shard: PathBuf,
        spawn: impl FnOnce() -> io::Result<WorkerHandle>,
    ) -> Result<bool, CaptureError> {
        if self.active.contains_key(&shard) {
            return Ok(false);
        }
        let handle = spawn().map_err(|e| {
            CaptureError::Unknown(format!("failed to spawn upload worker for {}: {}", shard.display(), e))
        })?;
        self.active.insert(shard, handle);
        Ok(true)
    }

    /// Remove and join every worker that has finished.
    pub fn reap(&mut self) -> Vec<(PathBuf, WorkerResult)> {
        let finished: Vec<PathBuf> = self
            .active
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(path, _)| path.clone())
            .collect();

        finished
            .into_iter()
            .filter_map(|path| {
                let handle = self.active.remove(&path)?;
                Some((path, join(handle)))
            })
            .collect()
    }

    /// Block until every registered worker has finished.
    pub fn wait_idle(&mut self) -> Vec<(PathBuf, WorkerResult)> {
        std::mem::take(&mut self.active)
            .into_iter()
            .map(|(path, handle)| (path, join(handle)))
            .collect()
    }
}

fn join(handle: WorkerHandle) -> WorkerResult {
    handle.join().map_err(|panic| {
        panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "worker panicked".into())
    })
}
