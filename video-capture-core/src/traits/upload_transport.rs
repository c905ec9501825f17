use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::TransferError;
use crate::models::upload_metadata::UploadMetadata;
use crate::models::upload_task::{ChunkAck, UploadProgress, UploadSession};

/// Location of the pre-provisioned credential blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw blob. Missing or unreadable material is `AuthUnavailable`.
    pub fn read_blob(&self) -> Result<Vec<u8>, TransferError> {
        fs::read(&self.path).map_err(|e| {
            TransferError::AuthUnavailable(format!("unable to read {}: {}", self.path.display(), e))
        })
    }
}

/// Credentials materialized by a transport for one upload attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    secret: String,
}

impl Credentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

/// Interface for the remote store's resumable transfer protocol.
///
/// Implementations are shared by every worker thread.
pub trait UploadTransport: Send + Sync {
    fn authenticate(&self, store: &CredentialStore) -> Result<Credentials, TransferError>;

    /// Open a new remote session, or adopt `prior` without re-sending
    /// anything below its offset.
    fn begin_or_resume_session(
        &self,
        credentials: &Credentials,
        shard: &Path,
        metadata: &UploadMetadata,
        prior: Option<&UploadProgress>,
        chunk_size: u64,
    ) -> Result<UploadSession, TransferError>;

    /// Send the chunk at `session.offset` and advance the session to the
    /// acknowledged offset.
    fn send_next_chunk(
        &self,
        credentials: &Credentials,
        session: &mut UploadSession,
    ) -> Result<ChunkAck, TransferError>;
}
