//! # video-capture-linux
//!
//! Linux backend for video-capture.
//!
//! Provides:
//! - `PipeCaptureDriver`: capture from an external camera command's stdout
//! - `HttpTransport`: resumable chunked upload over HTTP with bearer auth
//! - `ThermalLoggingUsage`: disk probe that also logs the SoC temperature
//! - `DaemonConfig`: TOML configuration for the `video-capture` binary
//!
//! ## Usage
//! ```ignore
//! use video_capture_core::{ConnectivityMonitor, ShardedRecorder};
//! use video_capture_linux::{DaemonConfig, PipeCaptureDriver};
//!
//! let config = DaemonConfig::load("video-capture.toml".as_ref())?;
//! let driver = PipeCaptureDriver::new(
//!     config.driver.command.clone(),
//!     config.driver.framerate,
//!     config.capture.recorder.flush_interval,
//! );
//! let connectivity = ConnectivityMonitor::from_config(&config.capture.connectivity);
//! let mut recorder = ShardedRecorder::new(
//!     driver,
//!     config.capture.storage.clone(),
//!     config.capture.recorder.clone(),
//!     connectivity,
//! );
//! recorder.run();
//! ```

pub mod config_file;
pub mod credentials;
pub mod http_transport;
pub mod pipe_driver;
pub mod thermal;

pub use config_file::{DaemonConfig, DriverConfig};
pub use http_transport::{HttpTransport, TransportConfig};
pub use pipe_driver::PipeCaptureDriver;
pub use thermal::ThermalLoggingUsage;
