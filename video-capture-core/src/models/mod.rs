pub mod config;
pub mod error;
pub mod session;
pub mod shard;
pub mod upload_metadata;
pub mod upload_task;
