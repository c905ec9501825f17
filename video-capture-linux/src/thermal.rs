//! Disk probe that also logs the SoC temperature on every measurement.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use video_capture_core::traits::disk_usage::{DiskUsage, FsDiskUsage};

pub const DEFAULT_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

pub struct ThermalLoggingUsage {
    inner: FsDiskUsage,
    sensor: PathBuf,
}

impl ThermalLoggingUsage {
    pub fn new(inner: FsDiskUsage, sensor: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            sensor: sensor.into(),
        }
    }
}

impl DiskUsage for ThermalLoggingUsage {
    fn used_percent(&self) -> io::Result<u8> {
        match read_celsius(&self.sensor) {
            Some(celsius) => log::debug!("Device temperature: {:.1}'C", celsius),
            None => log::debug!("Device temperature unavailable at {}", self.sensor.display()),
        }
        self.inner.used_percent()
    }
}

/// Kernel thermal zones report millidegrees Celsius.
fn read_celsius(sensor: &Path) -> Option<f64> {
    let raw = fs::read_to_string(sensor).ok()?;
    let millis: i64 = raw.trim().parse().ok()?;
    Some(millis as f64 / 1000.0)
}
