use std::time::Duration;

use super::video_sink::SharedSink;
use crate::models::error::CaptureError;

/// Hint passed to the driver when capture starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationHint {
    /// Splits happen at this period, so the stream should emit a key frame
    /// at least this often.
    pub key_frame_interval: Duration,
}

/// Interface for the hardware (or process) producing the captured stream.
///
/// Implemented by:
/// - `PipeCaptureDriver` (Linux, external capture command)
/// - test doubles in `testing`
pub trait CaptureDriver: Send {
    /// Begin streaming into `sink`.
    fn start(&mut self, sink: SharedSink, hint: RotationHint) -> Result<(), CaptureError>;

    /// Persist buffered data and continue writing into `sink`, which may be
    /// the current target or a freshly opened shard.
    fn split_to(&mut self, sink: SharedSink) -> Result<(), CaptureError>;

    /// Block for one flush interval while capture continues.
    fn wait_flush_interval(&mut self) -> Result<(), CaptureError>;

    /// Stop streaming and release the device.
    fn stop(&mut self) -> Result<(), CaptureError>;
}
