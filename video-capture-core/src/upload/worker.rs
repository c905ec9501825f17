use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::models::config::UploadConfig;
use crate::models::error::{CaptureError, TransferError};
use crate::models::shard::{file_size, ShardName};
use crate::models::upload_metadata::UploadMetadata;
use crate::models::upload_task::{ChunkAck, UploadOutcome, UploadProgress, UploadSession};
use crate::storage::progress_store::ProgressStore;
use crate::traits::upload_transport::{CredentialStore, Credentials, UploadTransport};

/// Transfers one shard through a resumable session.
///
/// ```text
/// authenticate ─✗→ AuthUnavailable (nothing touched)
///      │
/// load progress record ──→ begin or resume session
///      │
/// send chunk ─ retry ─→ persist record ─→ send chunk ... ─→ done
///      │                                                    │
///      ├─ unreachable → Unreachable (record kept)           ├─ remove record
///      ├─ shutdown    → Interrupted (record kept)           └─ delete shard
///      ├─ stale       → Restarted (record removed)
///      ├─ evicted     → Failed (record removed)
///      └─ rejected    → Failed
/// ```
pub struct UploadWorker {
    shard_path: PathBuf,
    name: ShardName,
    transport: Arc<dyn UploadTransport>,
    progress: ProgressStore,
    credentials: CredentialStore,
    config: UploadConfig,
    running: Arc<AtomicBool>,
}

impl UploadWorker {
    pub fn new(
        shard_path: PathBuf,
        name: ShardName,
        transport: Arc<dyn UploadTransport>,
        progress: ProgressStore,
        credentials: CredentialStore,
        config: UploadConfig,
    ) -> Self {
        Self {
            shard_path,
            name,
            transport,
            progress,
            credentials,
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Share a shutdown flag; once cleared the worker stops before its next
    /// chunk and keeps its progress record.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn shard_path(&self) -> &Path {
        &self.shard_path
    }

    /// Run one upload attempt to its end. Never panics on expected
    /// remote or filesystem conditions; they all map to an outcome.
    pub fn run(&self) -> UploadOutcome {
        let credentials = match self.transport.authenticate(&self.credentials) {
            Ok(credentials) => credentials,
            Err(e) => {
                log::error!(
                    "Unable to read credentials at {} to upload {}: {}",
                    self.credentials.path().display(),
                    self.name,
                    e
                );
                return UploadOutcome::AuthUnavailable;
            }
        };

        let size = file_size(&self.shard_path);
        if size == 0 {
            log::debug!("{} vanished or is empty, nothing to upload", self.name);
            return UploadOutcome::Failed(format!("{} is empty", self.name));
        }

        let metadata = UploadMetadata::for_shard(&self.name, size, &self.config);
        log::info!("Preparing to upload {} as \"{}\"", self.name, metadata.title());

        let prior = self.load_progress();
        if let Some(prior) = &prior {
            log::info!(
                "Resuming upload of {} from byte {}",
                self.name,
                prior.resumable_progress
            );
        }
        let resume_offset = prior.as_ref().map_or(0, |p| p.resumable_progress);

        let mut session = match self.transport.begin_or_resume_session(
            &credentials,
            &self.shard_path,
            &metadata,
            prior.as_ref(),
            self.config.chunk_size,
        ) {
            Ok(session) => session,
            Err(e) => return self.abandon(e, resume_offset),
        };

        self.transfer(&credentials, &mut session)
    }

    fn transfer(&self, credentials: &Credentials, session: &mut UploadSession) -> UploadOutcome {
        let mut reported = session.fraction();
        loop {
            if !self.running.load(Ordering::SeqCst) {
                log::info!("Pausing upload of {} at byte {} for shutdown", self.name, session.offset);
                return UploadOutcome::Interrupted {
                    offset: session.offset,
                };
            }

            let ack = match self.send_with_retries(credentials, session) {
                Ok(ack) => ack,
                Err(e) => return self.abandon(e, session.offset),
            };

            if ack.done {
                return self.finish(ack.remote_result);
            }

            if let Err(e) = self.progress.save(self.name.file_name(), &ack.progress) {
                log::error!("Failed to persist upload progress of {}: {}", self.name, e);
            }
            // Evicted while the chunk was in flight.
            if !self.shard_path.exists() {
                log::warn!("{} was removed while uploading, abandoning it", self.name);
                self.drop_progress();
                return UploadOutcome::Failed(format!("{} was removed during upload", self.name));
            }

            let fraction = session.fraction();
            if fraction - reported > 0.01 {
                log::info!("Uploading {} [{:.1}%]", self.name, fraction * 100.0);
                reported = fraction;
            }
        }
    }

    fn send_with_retries(
        &self,
        credentials: &Credentials,
        session: &mut UploadSession,
    ) -> Result<ChunkAck, TransferError> {
        let mut attempt = 0;
        loop {
            match self.transport.send_next_chunk(credentials, session) {
                Ok(ack) => return Ok(ack),
                Err(e) if e.is_retryable() && attempt < self.config.chunk_retries => {
                    attempt += 1;
                    log::warn!(
                        "Chunk at byte {} of {} failed ({}), retry {}/{}",
                        session.offset,
                        self.name,
                        e,
                        attempt,
                        self.config.chunk_retries
                    );
                    thread::sleep(self.config.retry_pause);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn load_progress(&self) -> Option<UploadProgress> {
        match self.progress.load(self.name.file_name()) {
            Ok(progress) => progress,
            Err(e @ CaptureError::InvalidProgress { .. }) => {
                log::warn!("{}; starting {} from scratch", e, self.name);
                self.drop_progress();
                None
            }
            Err(e) => {
                log::warn!("Cannot read upload progress of {}: {}", self.name, e);
                None
            }
        }
    }

    fn abandon(&self, err: TransferError, offset: u64) -> UploadOutcome {
        match err {
            TransferError::Unreachable(reason) => {
                log::debug!(
                    "Couldn't upload {} since no connection is available: {}",
                    self.name,
                    reason
                );
                UploadOutcome::Unreachable { offset }
            }
            TransferError::StaleSession(reason) => {
                log::warn!("Upload session of {} is no longer valid: {}", self.name, reason);
                log::info!("Removing upload progress of {} and starting again", self.name);
                self.drop_progress();
                UploadOutcome::Restarted
            }
            TransferError::AuthUnavailable(reason) => {
                log::error!("Credentials rejected while uploading {}: {}", self.name, reason);
                UploadOutcome::AuthUnavailable
            }
            e @ (TransferError::Retryable(_) | TransferError::Rejected(_)) => {
                log::error!("Upload of {} failed: {}", self.name, e);
                UploadOutcome::Failed(e.to_string())
            }
        }
    }

    fn finish(&self, remote_result: Option<String>) -> UploadOutcome {
        log::info!(
            "Successfully uploaded {}: {}",
            self.name,
            remote_result.as_deref().unwrap_or("-")
        );
        self.drop_progress();
        match std::fs::remove_file(&self.shard_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::error!("Uploaded {} but could not delete it: {}", self.name, e),
        }
        UploadOutcome::Completed { remote_result }
    }

    fn drop_progress(&self) {
        if let Err(e) = self.progress.remove(self.name.file_name()) {
            log::warn!("Failed to remove upload progress of {}: {}", self.name, e);
        }
    }
}
