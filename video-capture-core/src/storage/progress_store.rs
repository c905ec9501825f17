use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::upload_task::UploadProgress;

/// One JSON progress record per in-flight upload.
///
/// Records are named `{shard file name}.json` and hold
/// `{"resumable_progress": .., "resumable_uri": ..}`. Writes go to a
/// uniquely named temp file that is renamed over the record, so a reader
/// only ever sees the previous or the new record.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    dir: PathBuf,
}

impl ProgressStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, shard_file_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", shard_file_name))
    }

    /// Load the record for a shard. `Ok(None)` when there is none.
    pub fn load(&self, shard_file_name: &str) -> Result<Option<UploadProgress>, CaptureError> {
        let path = self.record_path(shard_file_name);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CaptureError::StorageError(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| CaptureError::InvalidProgress {
                path,
                reason: e.to_string(),
            })
    }

    pub fn save(&self, shard_file_name: &str, progress: &UploadProgress) -> Result<(), CaptureError> {
        let path = self.record_path(shard_file_name);
        let json = serde_json::to_vec(progress)
            .map_err(|e| CaptureError::StorageError(format!("failed to serialize progress: {}", e)))?;

        fs::create_dir_all(&self.dir)
            .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;

        let tmp_path = self
            .dir
            .join(format!(".{}.{}.tmp", shard_file_name, uuid::Uuid::new_v4()));
        let result = write_synced(&tmp_path, &json).and_then(|()| fs::rename(&tmp_path, &path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(CaptureError::StorageError(format!(
                "failed to write {}: {}",
                path.display(),
                e
            )));
        }
        Ok(())
    }

    /// Remove the record for a shard. Returns whether one existed.
    pub fn remove(&self, shard_file_name: &str) -> Result<bool, CaptureError> {
        let path = self.record_path(shard_file_name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CaptureError::StorageError(format!(
                "failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}
