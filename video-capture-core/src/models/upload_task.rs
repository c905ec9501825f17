use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Resumable transfer state persisted after every acknowledged chunk.
///
/// The offset and the session handle only ever travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    /// Bytes acknowledged by the remote side.
    pub resumable_progress: u64,

    /// Opaque handle identifying the remote resumable session.
    pub resumable_uri: String,
}

/// A live resumable session for one shard, owned by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub shard_path: PathBuf,
    pub resumable_uri: String,

    /// Next byte to send.
    pub offset: u64,

    /// Shard size when the session was opened.
    pub total_bytes: u64,

    pub chunk_size: u64,
}

impl UploadSession {
    pub fn progress(&self) -> UploadProgress {
        UploadProgress {
            resumable_progress: self.offset,
            resumable_uri: self.resumable_uri.clone(),
        }
    }

    /// Byte range `[start, end)` of the next chunk to send.
    pub fn next_range(&self) -> (u64, u64) {
        let end = self.offset.saturating_add(self.chunk_size).min(self.total_bytes);
        (self.offset, end)
    }

    /// Fraction of the shard acknowledged so far (0.0–1.0).
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        self.offset as f64 / self.total_bytes as f64
    }
}

/// Remote acknowledgement of one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkAck {
    pub progress: UploadProgress,

    /// The remote side holds the complete shard.
    pub done: bool,

    /// Remote response once `done` (e.g. the created resource).
    pub remote_result: Option<String>,
}

/// How an upload attempt for one shard ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Shard and progress record deleted locally.
    Completed { remote_result: Option<String> },

    /// Credentials missing or unreadable; nothing was touched.
    AuthUnavailable,

    /// Connectivity lost; the progress record stays for a later resume.
    Unreachable { offset: u64 },

    /// Shutdown was requested between chunks; the record stays.
    Interrupted { offset: u64 },

    /// The remote dropped the stored session; the record was removed.
    Restarted,

    /// Chunk retries exhausted or the remote refused the upload.
    Failed(String),
}

impl UploadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(offset: u64, total: u64) -> UploadSession {
        UploadSession {
            shard_path: PathBuf::from("video/2024-05-01_13-45.000.h264"),
            resumable_uri: "https://upload.example/session/1".into(),
            offset,
            total_bytes: total,
            chunk_size: 40,
        }
    }

    #[test]
    fn next_range_clamps_to_total() {
        assert_eq!(session(0, 100).next_range(), (0, 40));
        assert_eq!(session(80, 100).next_range(), (80, 100));
        assert_eq!(session(100, 100).next_range(), (100, 100));
    }

    #[test]
    fn progress_serializes_with_wire_names() {
        let json = serde_json::to_value(session(40, 100).progress()).unwrap();
        assert_eq!(json["resumable_progress"], 40);
        assert_eq!(json["resumable_uri"], "https://upload.example/session/1");
    }

    #[test]
    fn empty_shard_counts_as_complete_fraction() {
        assert_eq!(session(0, 0).fraction(), 1.0);
        assert_eq!(session(25, 100).fraction(), 0.25);
    }
}
