pub mod capture_driver;
pub mod disk_usage;
pub mod reachability;
pub mod upload_transport;
pub mod video_sink;
