//! Test doubles shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::{CaptureError, TransferError};
use crate::models::upload_metadata::UploadMetadata;
use crate::models::upload_task::{ChunkAck, UploadProgress, UploadSession};
use crate::storage::shard_directory::list_shards;
use crate::traits::capture_driver::{CaptureDriver, RotationHint};
use crate::traits::disk_usage::DiskUsage;
use crate::traits::reachability::ReachabilityProbe;
use crate::traits::upload_transport::{CredentialStore, Credentials, UploadTransport};
use crate::traits::video_sink::SharedSink;

pub fn write_shard(dir: &Path, name: &str, size: usize) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, vec![0u8; size]).unwrap();
    path
}

/// Replays a fixed sequence of probe results, then repeats the last one.
pub struct ScriptedProbe {
    script: Mutex<VecDeque<bool>>,
    last: Mutex<bool>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProbe {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(false),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl ReachabilityProbe for ScriptedProbe {
    fn probe(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock();
        if let Some(next) = self.script.lock().pop_front() {
            *last = next;
        }
        *last
    }
}

/// Disk usage pinned to a percentage the test can move.
pub struct FixedUsage {
    percent: Arc<AtomicU8>,
}

impl FixedUsage {
    pub fn new(percent: u8) -> Self {
        Self {
            percent: Arc::new(AtomicU8::new(percent)),
        }
    }

    pub fn handle(&self) -> Arc<AtomicU8> {
        Arc::clone(&self.percent)
    }
}

impl DiskUsage for FixedUsage {
    fn used_percent(&self) -> io::Result<u8> {
        Ok(self.percent.load(Ordering::SeqCst))
    }
}

/// Disk of `capacity` bytes holding `baseline` bytes plus the shards in `dir`.
pub struct DirectoryUsage {
    dir: PathBuf,
    capacity: u64,
    baseline: u64,
}

impl DirectoryUsage {
    pub fn new(dir: &Path, capacity: u64, baseline: u64) -> Self {
        Self {
            dir: dir.to_path_buf(),
            capacity,
            baseline,
        }
    }
}

impl DiskUsage for DirectoryUsage {
    fn used_percent(&self) -> io::Result<u8> {
        let shards: u64 = list_shards(&self.dir)
            .map_err(|e| io::Error::other(e.to_string()))?
            .iter()
            .map(|s| s.size())
            .sum();
        let used = self.baseline + shards;
        Ok(((used * 100).div_ceil(self.capacity)).min(100) as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEvent {
    Start,
    Split,
    Wait,
    Stop,
}

/// Capture driver that appends a scripted number of bytes on every split.
pub struct ScriptedDriver {
    writes: VecDeque<usize>,
    default_write: usize,
    fail_start: bool,
    current: Option<SharedSink>,
    events: Arc<Mutex<Vec<DriverEvent>>>,
}

impl ScriptedDriver {
    pub fn new(writes: impl IntoIterator<Item = usize>, default_write: usize) -> Self {
        Self {
            writes: writes.into_iter().collect(),
            default_write,
            fail_start: false,
            current: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::new(Vec::new(), 0)
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<DriverEvent>>> {
        Arc::clone(&self.events)
    }
}

impl CaptureDriver for ScriptedDriver {
    fn start(&mut self, sink: SharedSink, _hint: RotationHint) -> Result<(), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::DriverFailed("camera not attached".into()));
        }
        self.current = Some(sink);
        self.events.lock().push(DriverEvent::Start);
        Ok(())
    }

    fn split_to(&mut self, sink: SharedSink) -> Result<(), CaptureError> {
        let n = self.writes.pop_front().unwrap_or(self.default_write);
        {
            let mut target = sink.lock();
            target.write(&vec![0u8; n])?;
            target.flush()?;
        }
        self.current = Some(sink);
        self.events.lock().push(DriverEvent::Split);
        Ok(())
    }

    fn wait_flush_interval(&mut self) -> Result<(), CaptureError> {
        self.events.lock().push(DriverEvent::Wait);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(sink) = self.current.take() {
            sink.lock().flush()?;
        }
        self.events.lock().push(DriverEvent::Stop);
        Ok(())
    }
}

#[derive(Default)]
struct TransportState {
    sent: Vec<(u64, u64)>,
    sessions_opened: usize,
    resumed_from: Vec<u64>,
    unreachable_after: Option<usize>,
    retryable_failures: usize,
    reject_resume: bool,
}

/// In-memory resumable endpoint that records every byte range it accepts.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<TransportState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `chunks` sends, then report the network as gone.
    pub fn unreachable_after(self, chunks: usize) -> Self {
        self.state.lock().unreachable_after = Some(chunks);
        self
    }

    /// Fail the next `count` sends with a retryable error.
    pub fn retryable_failures(self, count: usize) -> Self {
        self.state.lock().retryable_failures = count;
        self
    }

    /// Refuse any attempt to resume a stored session.
    pub fn rejecting_resume(self) -> Self {
        self.state.lock().reject_resume = true;
        self
    }

    pub fn sent_ranges(&self) -> Vec<(u64, u64)> {
        self.state.lock().sent.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.lock().sessions_opened
    }

    pub fn resumed_from(&self) -> Vec<u64> {
        self.state.lock().resumed_from.clone()
    }
}

impl UploadTransport for MockTransport {
    fn authenticate(&self, store: &CredentialStore) -> Result<Credentials, TransferError> {
        let blob = store.read_blob()?;
        Ok(Credentials::new(String::from_utf8_lossy(&blob).trim().to_string()))
    }

    fn begin_or_resume_session(
        &self,
        _credentials: &Credentials,
        shard: &Path,
        metadata: &UploadMetadata,
        prior: Option<&UploadProgress>,
        chunk_size: u64,
    ) -> Result<UploadSession, TransferError> {
        let mut state = self.state.lock();
        let (resumable_uri, offset) = match prior {
            Some(_) if state.reject_resume => {
                return Err(TransferError::StaleSession("session expired".into()));
            }
            Some(prior) => {
                state.resumed_from.push(prior.resumable_progress);
                (prior.resumable_uri.clone(), prior.resumable_progress)
            }
            None => {
                state.sessions_opened += 1;
                (format!("mock://session/{}", state.sessions_opened), 0)
            }
        };
        Ok(UploadSession {
            shard_path: shard.to_path_buf(),
            resumable_uri,
            offset,
            total_bytes: metadata.size_bytes,
            chunk_size,
        })
    }

    fn send_next_chunk(
        &self,
        _credentials: &Credentials,
        session: &mut UploadSession,
    ) -> Result<ChunkAck, TransferError> {
        let mut state = self.state.lock();
        if state.unreachable_after == Some(state.sent.len()) {
            return Err(TransferError::Unreachable("no route to host".into()));
        }
        if state.retryable_failures > 0 {
            state.retryable_failures -= 1;
            return Err(TransferError::Retryable("503 backend error".into()));
        }

        let (start, end) = session.next_range();
        state.sent.push((start, end));
        session.offset = end;
        let done = end >= session.total_bytes;
        Ok(ChunkAck {
            progress: session.progress(),
            done,
            remote_result: done.then(|| format!("{{\"id\":\"{}\"}}", session.resumable_uri)),
        })
    }
}
