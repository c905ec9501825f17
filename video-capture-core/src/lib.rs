//! # video-capture-core
//!
//! Platform-agnostic core of an always-on camera recorder.
//!
//! Records while the device is offline, splitting the stream into size-bounded
//! shards, and uploads finished shards through a resumable, crash-safe protocol
//! once connectivity returns. The disk is kept under a free-space watermark by
//! evicting the oldest shards. Platform backends (a capture process, an HTTP
//! upload endpoint) implement `CaptureDriver` and `UploadTransport` and plug into
//! `ShardedRecorder` and `UploadCoordinator`.
//!
//! ## Architecture
//!
//! ```text
//! video-capture-core (this crate)
//! ├── traits/   ← CaptureDriver, VideoSink, UploadTransport, ReachabilityProbe, DiskUsage
//! ├── models/   ← CaptureError, TransferError, CaptureConfiguration, ShardName, UploadProgress, etc.
//! ├── monitor/  ← ConnectivityMonitor, RetentionManager, Throttle
//! ├── session/  ← ShardedRecorder (recorder loop)
//! ├── storage/  ← ShardFile, ProgressStore, shard directory scans
//! └── upload/   ← UploadCoordinator, UploadWorker, WorkerRegistry
//! ```
//!
//! The recorder and the watcher share nothing but the filesystem: the shard
//! directory is a best-effort work list and `uploads/` holds one progress
//! record per in-flight upload.

pub mod models;
pub mod monitor;
pub mod session;
pub mod storage;
pub mod traits;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types at crate root for convenience.
pub use models::config::{
    CaptureConfiguration, ConnectivityConfig, DeletionFailurePolicy, RecorderConfig, RetentionConfig,
    StorageLayout, UploadConfig,
};
pub use models::error::{CaptureError, TransferError};
pub use models::session::SessionOutcome;
pub use models::shard::{MediaShard, ShardName};
pub use models::upload_metadata::UploadMetadata;
pub use models::upload_task::{ChunkAck, UploadOutcome, UploadProgress, UploadSession};
pub use monitor::connectivity::ConnectivityMonitor;
pub use monitor::retention::{ReclaimOutcome, RetentionManager};
pub use session::recorder::ShardedRecorder;
pub use storage::progress_store::ProgressStore;
pub use storage::shard_file::ShardFile;
pub use traits::capture_driver::{CaptureDriver, RotationHint};
pub use traits::disk_usage::{DiskUsage, FsDiskUsage};
pub use traits::reachability::{ReachabilityProbe, TcpProbe};
pub use traits::upload_transport::{CredentialStore, Credentials, UploadTransport};
pub use traits::video_sink::{SharedSink, VideoSink};
pub use upload::coordinator::{CycleReport, UploadCoordinator};
pub use upload::registry::WorkerRegistry;
pub use upload::worker::UploadWorker;
