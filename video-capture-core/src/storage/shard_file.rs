use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::models::error::CaptureError;
use crate::models::shard::{MediaShard, ShardName};
use crate::traits::video_sink::VideoSink;

/// Append-only writer for one shard.
///
/// Opening an existing shard appends to it, so a session restarted within
/// the same minute continues the file rather than truncating it.
pub struct ShardFile {
    shard: MediaShard,
    file: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl ShardFile {
    pub fn new(shard: MediaShard) -> Self {
        Self {
            shard,
            file: None,
            bytes_written: 0,
        }
    }

    /// Open shard `name` in `dir` for appending.
    pub fn create(dir: &Path, name: ShardName) -> Result<Self, CaptureError> {
        let mut shard_file = Self::new(MediaShard::at(dir, name));
        let path = shard_file.shard.path().to_path_buf();
        shard_file.open(&path)?;
        Ok(shard_file)
    }

    pub fn shard(&self) -> &MediaShard {
        &self.shard
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Bytes appended through this handle (not counting earlier sessions).
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl VideoSink for ShardFile {
    fn open(&mut self, path: &Path) -> Result<(), CaptureError> {
        if self.file.is_some() {
            if path == self.shard.path() {
                return Ok(());
            }
            self.close()?;
        }

        if path != self.shard.path() {
            self.shard = MediaShard::from_path(path).ok_or_else(|| {
                CaptureError::StorageError(format!("not a shard path: {}", path.display()))
            })?;
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    CaptureError::StorageError(format!("failed to create directory: {}", e))
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CaptureError::StorageError(format!("failed to open shard: {}", e)))?;
        self.file = Some(BufWriter::new(file));
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("shard is not open".into()))?;
        file.write_all(data)
            .map_err(|e| CaptureError::StorageError(format!("write failed: {}", e)))?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CaptureError> {
        if let Some(file) = self.file.as_mut() {
            file.flush()
                .map_err(|e| CaptureError::StorageError(format!("flush failed: {}", e)))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        file.flush()
            .map_err(|e| CaptureError::StorageError(format!("flush failed: {}", e)))?;
        file.get_ref()
            .sync_data()
            .map_err(|e| CaptureError::StorageError(format!("sync failed: {}", e)))?;
        Ok(())
    }

    fn current_size(&self) -> u64 {
        self.shard.size()
    }
}

impl Drop for ShardFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close {}: {}", self.shard, e);
        }
    }
}
