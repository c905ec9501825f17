use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::shard::{file_size, ShardName};

/// A shard found by a directory scan.
///
/// The directory is shared with the recorder and upload workers, so the
/// file may already be gone by the time it is looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardEntry {
    pub path: PathBuf,
    pub name: ShardName,
}

impl ShardEntry {
    pub fn size(&self) -> u64 {
        file_size(&self.path)
    }
}

/// List every shard in `dir`, oldest first (session, then index).
///
/// Non-shard entries are ignored; a missing directory is empty.
pub fn list_shards(dir: &Path) -> Result<Vec<ShardEntry>, CaptureError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(CaptureError::StorageError(format!(
                "failed to list {}: {}",
                dir.display(),
                e
            )))
        }
    };

    let mut shards: Vec<ShardEntry> = entries
        .flatten()
        .filter_map(|entry| {
            let file_name = entry.file_name();
            let name = ShardName::parse(file_name.to_str()?)?;
            Some(ShardEntry {
                path: entry.path(),
                name,
            })
        })
        .collect();
    shards.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(shards)
}
