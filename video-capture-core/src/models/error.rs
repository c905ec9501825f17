use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while capturing, retaining or uploading shards.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission denied deleting {}: {reason}", path.display())]
    PermissionDenied { path: PathBuf, reason: String },

    #[error("capture driver failed: {0}")]
    DriverFailed(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("invalid upload progress in {}: {reason}", path.display())]
    InvalidProgress { path: PathBuf, reason: String },

    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Outcome of a failed call across the `UploadTransport` seam.
///
/// These are expected conditions on an often-offline device, so the worker
/// branches on them rather than treating them as fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Credential material is missing or unreadable.
    #[error("credentials unavailable: {0}")]
    AuthUnavailable(String),

    /// The remote store could not be reached at all.
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The remote no longer recognises the stored session handle or offset.
    #[error("stale upload session: {0}")]
    StaleSession(String),

    /// A remote failure that may succeed if the same chunk is sent again.
    #[error("retryable remote error: {0}")]
    Retryable(String),

    /// A remote failure that will not succeed on retry.
    #[error("remote rejected upload: {0}")]
    Rejected(String),
}

impl TransferError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}
