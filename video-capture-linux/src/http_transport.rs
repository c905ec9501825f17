//! Resumable HTTP upload protocol.
//!
//! ```text
//! POST {endpoint}?uploadType=resumable    → 200, Location: {session}
//! PUT  {session}  Content-Range: a-b/N    → 308, Range: bytes=0-b   (more)
//!                                         → 200/201, body           (done)
//! PUT  {session}  Content-Range: */N      → current offset (resume probe)
//! ```

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use video_capture_core::models::error::TransferError;
use video_capture_core::models::upload_metadata::UploadMetadata;
use video_capture_core::models::upload_task::{ChunkAck, UploadProgress, UploadSession};
use video_capture_core::traits::upload_transport::{CredentialStore, Credentials, UploadTransport};

use crate::credentials::read_bearer_token;

/// HTTP status the resumable protocol uses for "chunk stored, send more".
const RESUME_INCOMPLETE: u16 = 308;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Resumable upload endpoint.
    pub endpoint: String,

    /// Media type announced for the shard bytes.
    pub content_type: String,

    pub connect_timeout_secs: u64,

    /// Read/write timeout per request; a chunk must finish within it.
    pub io_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://www.googleapis.com/upload/youtube/v3/videos".into(),
            content_type: "video/*".into(),
            connect_timeout_secs: 10,
            io_timeout_secs: 300,
        }
    }
}

/// `UploadTransport` over HTTP with bearer-token auth.
pub struct HttpTransport {
    agent: ureq::Agent,
    config: TransportConfig,
}

/// How a PUT was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PutReply {
    /// Bytes `[0, offset)` are stored.
    Incomplete { offset: u64 },
    Done { body: String },
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.connect_timeout_secs))
            .timeout_read(Duration::from_secs(config.io_timeout_secs))
            .timeout_write(Duration::from_secs(config.io_timeout_secs))
            .redirects(0)
            .build();
        Self { agent, config }
    }

    fn open_session(&self, credentials: &Credentials, metadata: &UploadMetadata) -> Result<String, TransferError> {
        let url = format!(
            "{}?uploadType=resumable&part=snippet,status",
            self.config.endpoint
        );
        let body = serde_json::to_string(metadata)
            .map_err(|e| TransferError::Rejected(format!("cannot encode metadata: {}", e)))?;

        let response = check(
            self.agent
                .post(&url)
                .set("Authorization", &bearer(credentials))
                .set("Content-Type", "application/json; charset=UTF-8")
                .set("X-Upload-Content-Length", &metadata.size_bytes.to_string())
                .set("X-Upload-Content-Type", &self.config.content_type)
                .send_string(&body),
        )?;

        response
            .header("Location")
            .map(str::to_string)
            .ok_or_else(|| TransferError::Rejected("upload session has no Location".into()))
    }

    fn put(
        &self,
        credentials: &Credentials,
        session: &UploadSession,
        range: (u64, u64),
        body: &[u8],
    ) -> Result<PutReply, TransferError> {
        let response = check(
            self.agent
                .put(&session.resumable_uri)
                .set("Authorization", &bearer(credentials))
                .set("Content-Range", &content_range(range.0, range.1, session.total_bytes))
                .send_bytes(body),
        )?;

        match response.status() {
            RESUME_INCOMPLETE => Ok(PutReply::Incomplete {
                offset: parse_range(response.header("Range"))?,
            }),
            200 | 201 => {
                let body = response
                    .into_string()
                    .map_err(|e| TransferError::Unreachable(format!("reading response: {}", e)))?;
                Ok(PutReply::Done { body })
            }
            status => Err(TransferError::Rejected(format!("unexpected status {}", status))),
        }
    }
}

impl UploadTransport for HttpTransport {
    fn authenticate(&self, store: &CredentialStore) -> Result<Credentials, TransferError> {
        read_bearer_token(store)
    }

    fn begin_or_resume_session(
        &self,
        credentials: &Credentials,
        shard: &Path,
        metadata: &UploadMetadata,
        prior: Option<&UploadProgress>,
        chunk_size: u64,
    ) -> Result<UploadSession, TransferError> {
        let mut session = UploadSession {
            shard_path: shard.to_path_buf(),
            resumable_uri: String::new(),
            offset: 0,
            total_bytes: metadata.size_bytes,
            chunk_size,
        };

        let Some(prior) = prior else {
            session.resumable_uri = self.open_session(credentials, metadata)?;
            log::debug!("Opened upload session for {}", shard.display());
            return Ok(session);
        };

        // Ask the remote side what it holds rather than trusting the record.
        session.resumable_uri = prior.resumable_uri.clone();
        session.offset = match self.put(credentials, &session, (0, 0), &[])? {
            PutReply::Incomplete { offset } => offset,
            PutReply::Done { .. } => session.total_bytes,
        };
        if session.offset != prior.resumable_progress {
            log::info!(
                "Remote holds {} bytes of {}, record said {}",
                session.offset,
                shard.display(),
                prior.resumable_progress
            );
        }
        if session.offset > session.total_bytes {
            return Err(TransferError::StaleSession(format!(
                "remote offset {} beyond shard size {}",
                session.offset, session.total_bytes
            )));
        }
        Ok(session)
    }

    fn send_next_chunk(
        &self,
        credentials: &Credentials,
        session: &mut UploadSession,
    ) -> Result<ChunkAck, TransferError> {
        let range = session.next_range();
        let body = read_range(&session.shard_path, range)?;

        match self.put(credentials, session, range, &body)? {
            PutReply::Incomplete { offset } => {
                session.offset = offset;
                Ok(ChunkAck {
                    progress: session.progress(),
                    done: false,
                    remote_result: None,
                })
            }
            PutReply::Done { body } => {
                session.offset = session.total_bytes;
                Ok(ChunkAck {
                    progress: session.progress(),
                    done: true,
                    remote_result: Some(body),
                })
            }
        }
    }
}

fn bearer(credentials: &Credentials) -> String {
    format!("Bearer {}", credentials.secret())
}

/// Map a ureq result onto the transfer taxonomy.
fn check(result: Result<ureq::Response, ureq::Error>) -> Result<ureq::Response, TransferError> {
    match result {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(status_error(status, body.trim()))
        }
        Err(ureq::Error::Transport(e)) => Err(TransferError::Unreachable(e.to_string())),
    }
}

fn status_error(status: u16, body: &str) -> TransferError {
    let detail = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body)
    };
    match status {
        404 | 410 => TransferError::StaleSession(detail),
        429 | 500..=599 => TransferError::Retryable(detail),
        _ => TransferError::Rejected(detail),
    }
}

/// `Content-Range` for the half-open byte range `[start, end)`.
fn content_range(start: u64, end: u64, total: u64) -> String {
    if end > start {
        format!("bytes {}-{}/{}", start, end - 1, total)
    } else {
        format!("bytes */{}", total)
    }
}

/// Offset after the last stored byte, from a `Range: bytes=0-n` header.
fn parse_range(header: Option<&str>) -> Result<u64, TransferError> {
    let Some(header) = header else {
        return Ok(0);
    };
    header
        .trim()
        .strip_prefix("bytes=")
        .and_then(|range| range.split_once('-'))
        .and_then(|(_, last)| last.trim().parse::<u64>().ok())
        .map(|last| last + 1)
        .ok_or_else(|| TransferError::Rejected(format!("malformed Range header: {}", header)))
}

fn read_range(path: &Path, (start, end): (u64, u64)) -> Result<Vec<u8>, TransferError> {
    let read = || -> std::io::Result<Vec<u8>> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;
        let mut body = Vec::with_capacity((end - start) as usize);
        file.take(end - start).read_to_end(&mut body)?;
        Ok(body)
    };
    let body = read().map_err(|e| TransferError::Rejected(format!("cannot read {}: {}", path.display(), e)))?;
    if (body.len() as u64) < end - start {
        return Err(TransferError::Rejected(format!("{} shrank during upload", path.display())));
    }
    Ok(body)
}
