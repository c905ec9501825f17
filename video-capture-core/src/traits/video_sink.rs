use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::CaptureError;

/// Destination the capture driver writes raw stream bytes into.
///
/// Implemented by `ShardFile`. The recorder owns the sink; the driver only
/// holds a shared handle between `split_to` calls.
pub trait VideoSink: Send {
    /// Open (or re-open for append) the file at `path`.
    fn open(&mut self, path: &Path) -> Result<(), CaptureError>;

    fn write(&mut self, data: &[u8]) -> Result<(), CaptureError>;

    /// Push buffered bytes to disk.
    fn flush(&mut self) -> Result<(), CaptureError>;

    fn close(&mut self) -> Result<(), CaptureError>;

    /// Bytes currently on disk for the open file.
    fn current_size(&self) -> u64;
}

/// Sink handle shared between the recorder and the driver's pump thread.
pub type SharedSink = Arc<Mutex<dyn VideoSink>>;
