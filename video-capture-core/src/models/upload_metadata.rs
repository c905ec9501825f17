use serde::{Deserialize, Serialize};

use super::config::UploadConfig;
use super::shard::ShardName;

/// Descriptive metadata sent with a new remote upload session.
///
/// Serializes to the `snippet` / `status` resource body the resumable
/// endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub snippet: Snippet,
    pub status: Status,
    #[serde(skip)]
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub title: String,
    pub tags: Vec<String>,
    pub category_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub privacy_status: String,
}

impl UploadMetadata {
    /// Derive metadata for `shard` from its name alone.
    pub fn for_shard(shard: &ShardName, size_bytes: u64, config: &UploadConfig) -> Self {
        Self {
            snippet: Snippet {
                title: title_for(shard, &config.title_prefix),
                tags: config.tags.clone(),
                category_id: config.category_id.clone(),
            },
            status: Status {
                privacy_status: config.privacy_status.clone(),
            },
            size_bytes,
        }
    }

    pub fn title(&self) -> &str {
        &self.snippet.title
    }
}

/// `{prefix} 2024-05-01 13:45`, plus ` Part {n+1}` for index `n > 0`.
pub fn title_for(shard: &ShardName, prefix: &str) -> String {
    let when = shard.session().format("%Y-%m-%d %H:%M");
    let mut title = if prefix.is_empty() {
        when.to_string()
    } else {
        format!("{} {}", prefix, when)
    };
    if shard.index() > 0 {
        title.push_str(&format!(" Part {}", shard.index() + 1));
    }
    title
}
