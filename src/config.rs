//! TOML configuration for the orientation service

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::types::EstimatorSettings;

/// Everything needed to bring up an [`OrientationService`](crate::OrientationService)
///
/// Any field missing from the file takes its default, so an empty file is a
/// valid configuration.
///
/// ```toml
/// calibration_dir = "/var/lib/headtrack"
/// sample_period_ms = 10
/// auto_detect_up = true
///
/// [estimator]
/// strategy = "tilt-compass"
/// use_magnetometer = true
/// forward_axis = "-x"
/// up_axis = "y"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub estimator: EstimatorSettings,
    /// Where `gyro_config.json` and `mag_config_0x*.json` live
    pub calibration_dir: PathBuf,
    /// Loop cadence (10 ms = 100 Hz)
    pub sample_period_ms: u64,
    /// Detect the up axis from gravity at startup instead of trusting
    /// `estimator.up_axis`
    pub auto_detect_up: bool,
    pub detect_samples: usize,
    /// Readings averaged into a gyroscope bias when none is saved
    pub gyro_calibration_samples: usize,
    pub calibration_sample_period_ms: u64,
    /// Widen the magnetometer range and refresh offset/scale as samples arrive
    pub online_mag_calibration: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            estimator: EstimatorSettings::default(),
            calibration_dir: PathBuf::from("."),
            sample_period_ms: 10,
            auto_detect_up: false,
            detect_samples: 100,
            gyro_calibration_samples: 500,
            calibration_sample_period_ms: 5,
            online_mag_calibration: true,
        }
    }
}

impl ServiceConfig {
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn calibration_sample_period(&self) -> Duration {
        Duration::from_millis(self.calibration_sample_period_ms)
    }
}

/// Load config from `path`, or return defaults if it does not exist.
pub fn load_config(path: &Path) -> Result<ServiceConfig> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&contents)?;
        info!(?path, "Loaded config");
        Ok(config)
    } else {
        info!(?path, "No config found, using defaults");
        Ok(ServiceConfig::default())
    }
}

/// Save config to `path` as TOML.
pub fn save_config(path: &Path, config: &ServiceConfig) -> Result<()> {
    let contents = toml::to_string_pretty(config)?;
    fs::write(path, contents)?;
    info!(?path, "Saved config");
    Ok(())
}
