pub mod progress_store;
pub mod shard_directory;
pub mod shard_file;
