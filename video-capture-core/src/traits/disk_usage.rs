use std::io;
use std::path::PathBuf;

/// Reports how full the disk holding the shards is.
pub trait DiskUsage: Send {
    /// Used space as a whole percentage (0–100), rounded up like `df`.
    fn used_percent(&self) -> io::Result<u8>;
}

/// Disk statistics for the filesystem containing `path`.
#[derive(Debug, Clone)]
pub struct FsDiskUsage {
    path: PathBuf,
}

impl FsDiskUsage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DiskUsage for FsDiskUsage {
    fn used_percent(&self) -> io::Result<u8> {
        let total = fs2::total_space(&self.path)?;
        let available = fs2::available_space(&self.path)?;
        Ok(percent_used(total, available))
    }
}

/// `used / (used + available)`, rounded up, treating an empty filesystem as 0%.
pub(crate) fn percent_used(total: u64, available: u64) -> u8 {
    let used = total.saturating_sub(available) as u128;
    let usable = used + available as u128;
    if usable == 0 {
        return 0;
    }
    let percent = (used * 100).div_ceil(usable);
    percent.min(100) as u8
}
