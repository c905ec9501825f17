use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

/// `strftime` pattern of the session part of a shard name.
///
/// Minute resolution, and lexicographic order matches chronological order.
pub const SESSION_FORMAT: &str = "%Y-%m-%d_%H-%M";

/// Parsed shard file name: `{session}.{index}.{format}`.
///
/// ```text
/// 2024-05-01_13-45.002.h264
/// └── session ───┘ └┬┘ └┬─┘
///          index ───┘   └── format
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardName {
    session: NaiveDateTime,
    index: u32,
    file_name: String,
}

impl ShardName {
    /// Build the name for `index` within `session`, zero-padding the index to `width`.
    ///
    /// Seconds are dropped from `session`; the name only carries minutes.
    pub fn new(session: NaiveDateTime, index: u32, format: &str, width: usize) -> Self {
        let session_text = session.format(SESSION_FORMAT).to_string();
        let session = NaiveDateTime::parse_from_str(&session_text, SESSION_FORMAT).unwrap_or(session);
        Self {
            session,
            index,
            file_name: format!("{}.{:0width$}.{}", session_text, index, format, width = width),
        }
    }

    /// Parse a bare file name. Returns `None` for anything that is not a shard.
    pub fn parse(file_name: &str) -> Option<Self> {
        let mut parts = file_name.split('.');
        let session_text = parts.next()?;
        let index_text = parts.next()?;
        let format = parts.next()?;
        if parts.next().is_some() || format.is_empty() {
            return None;
        }
        if index_text.is_empty() || !index_text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let session = NaiveDateTime::parse_from_str(session_text, SESSION_FORMAT).ok()?;
        let index = index_text.parse().ok()?;
        Some(Self {
            session,
            index,
            file_name: file_name.to_string(),
        })
    }

    /// Start of the recording session this shard belongs to.
    pub fn session(&self) -> NaiveDateTime {
        self.session
    }

    /// Session part of the file name, e.g. `2024-05-01_13-45`.
    pub fn session_label(&self) -> String {
        self.session.format(SESSION_FORMAT).to_string()
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

/// Chronological: session first, then the numeric index, so `.1000.`
/// follows `.999.` even though it sorts before it as text.
impl Ord for ShardName {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.session, self.index, &self.file_name).cmp(&(other.session, other.index, &other.file_name))
    }
}

impl PartialOrd for ShardName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ShardName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name)
    }
}

/// One on-disk segment of a capture session.
///
/// The size is always read from disk; only the recorder appends to a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaShard {
    path: PathBuf,
    name: ShardName,
    is_new: bool,
}

impl MediaShard {
    /// Refer to the shard `name` inside `dir`, noting whether it is empty right now.
    pub fn at(dir: &Path, name: ShardName) -> Self {
        let path = dir.join(name.file_name());
        let is_new = file_size(&path) == 0;
        Self { path, name, is_new }
    }

    /// Refer to the shard at `path`, if its file name is a shard name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = ShardName::parse(path.file_name()?.to_str()?)?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        Some(Self::at(dir, name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &ShardName {
        &self.name
    }

    /// Whether the shard held no data when this handle was created.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Current size on disk; a missing file counts as empty.
    pub fn size(&self) -> u64 {
        file_size(&self.path)
    }

    pub fn remove(&self) -> io::Result<()> {
        fs::remove_file(&self.path)
    }
}

impl fmt::Display for MediaShard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<MediaShard:{}>", self.path.display())
    }
}

pub(crate) fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
