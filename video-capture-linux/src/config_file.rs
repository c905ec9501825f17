use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};

use video_capture_core::models::config::CaptureConfiguration;

use crate::http_transport::TransportConfig;
use crate::pipe_driver::INTRA_PERIOD_PLACEHOLDER;
use crate::thermal::DEFAULT_THERMAL_ZONE;

/// Camera process settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Program and arguments; `{intra_period}` becomes the key-frame period in frames.
    pub command: Vec<String>,

    pub framerate: u32,

    pub thermal_sensor: PathBuf,
}

impl Default for DriverConfig {
    fn default() -> Self {
        let command = [
            "raspivid", "-t", "0", "-w", "1640", "-h", "1232", "-fps", "30", "-ih", "-g",
            INTRA_PERIOD_PLACEHOLDER, "-o", "-",
        ];
        Self {
            command: command.iter().map(|arg| arg.to_string()).collect(),
            framerate: 30,
            thermal_sensor: PathBuf::from(DEFAULT_THERMAL_ZONE),
        }
    }
}

/// Everything the `video-capture` binary reads from its TOML file.
///
/// ```toml
/// [storage]
/// video_dir = "/home/pi/video"
///
/// [recorder]
/// flush_interval = 5
///
/// [driver]
/// command = ["raspivid", "-t", "0", "-g", "{intra_period}", "-o", "-"]
///
/// [transport]
/// endpoint = "https://www.googleapis.com/upload/youtube/v3/videos"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    #[serde(flatten)]
    pub capture: CaptureConfiguration,
    pub driver: DriverConfig,
    pub transport: TransportConfig,
}

impl DaemonConfig {
    /// Load and validate `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            log::info!("No configuration at {}, using defaults", path.display());
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let content =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config = Self::parse(&content).with_context(|| format!("loading {}", path.display()))?;
        Ok(config)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate().context("config validation failed")?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.capture.validate().map_err(|e| anyhow!(e))?;
        if self.driver.command.is_empty() {
            bail!("driver command is empty");
        }
        if self.driver.framerate == 0 {
            bail!("driver framerate must be positive");
        }
        if self.transport.endpoint.is_empty() {
            bail!("transport endpoint is empty");
        }
        Ok(())
    }
}
