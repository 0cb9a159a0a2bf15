//! On-disk calibration records
//!
//! Two kinds of small JSON files live in the calibration directory:
//!
//! - `gyro_config.json`: one global gyroscope bias, `{ "x", "y", "z" }`
//! - `mag_config_0x1c.json`: magnetometer offset/scale keyed by the bus
//!   address of the part, since compatible magnetometers can sit on
//!   different addresses
//!
//! A missing file is never an error: loaders report absence and callers
//! fall back to identity calibration.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calibration::{self, CalibrationProfile, MagCalibration};
use crate::error::Result;
use crate::transport::SensorTransport;

const GYRO_FILE: &str = "gyro_config.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct GyroRecord {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct MagRecord {
    offset_x: f64,
    offset_y: f64,
    offset_z: f64,
    scale_x: f64,
    scale_y: f64,
    scale_z: f64,
}

impl From<&MagCalibration> for MagRecord {
    fn from(cal: &MagCalibration) -> Self {
        Self {
            offset_x: cal.offset.x,
            offset_y: cal.offset.y,
            offset_z: cal.offset.z,
            scale_x: cal.scale.x,
            scale_y: cal.scale.y,
            scale_z: cal.scale.z,
        }
    }
}

impl From<MagRecord> for MagCalibration {
    fn from(record: MagRecord) -> Self {
        Self {
            offset: Vector3::new(record.offset_x, record.offset_y, record.offset_z),
            scale: Vector3::new(record.scale_x, record.scale_y, record.scale_z),
        }
    }
}

/// Directory of persisted calibration records
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    dir: PathBuf,
}

impl CalibrationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn gyro_path(&self) -> PathBuf {
        self.dir.join(GYRO_FILE)
    }

    pub fn mag_path(&self, bus_address: u8) -> PathBuf {
        self.dir.join(format!("mag_config_0x{bus_address:x}.json"))
    }

    /// Saved gyroscope bias, or `None` if it was never calibrated.
    pub fn load_gyro_bias(&self) -> Result<Option<Vector3<f64>>> {
        let Some(record) = read_record::<GyroRecord>(&self.gyro_path())? else {
            return Ok(None);
        };
        info!(path = ?self.gyro_path(), "Loaded gyroscope calibration");
        Ok(Some(Vector3::new(record.x, record.y, record.z)))
    }

    pub fn save_gyro_bias(&self, bias: &Vector3<f64>) -> Result<()> {
        let record = GyroRecord {
            x: bias.x,
            y: bias.y,
            z: bias.z,
        };
        write_record(&self.gyro_path(), &record)?;
        info!(path = ?self.gyro_path(), "Saved gyroscope calibration");
        Ok(())
    }

    /// Average `count` still readings into a gyroscope bias and persist it.
    pub fn calibrate_gyro_static<T: SensorTransport + ?Sized>(
        &self,
        transport: &mut T,
        count: usize,
        period: Duration,
        cancel: &AtomicBool,
    ) -> Result<Vector3<f64>> {
        let bias = calibration::estimate_gyro_bias(transport, count, period, cancel)?;
        self.save_gyro_bias(&bias)?;
        Ok(bias)
    }

    /// Saved bias if present, otherwise run a static calibration.
    pub fn load_or_calibrate_gyro<T: SensorTransport + ?Sized>(
        &self,
        transport: &mut T,
        count: usize,
        period: Duration,
        cancel: &AtomicBool,
    ) -> Result<Vector3<f64>> {
        match self.load_gyro_bias()? {
            Some(bias) => Ok(bias),
            None => self.calibrate_gyro_static(transport, count, period, cancel),
        }
    }

    /// Saved magnetometer record for `bus_address`, if any.
    pub fn find_mag_profile(&self, bus_address: u8) -> Result<Option<MagCalibration>> {
        let path = self.mag_path(bus_address);
        let record = read_record::<MagRecord>(&path)?;
        if record.is_some() {
            info!(?path, "Loaded magnetometer calibration");
        }
        Ok(record.map(MagCalibration::from))
    }

    /// Saved magnetometer calibration, or identity when none exists.
    pub fn load_mag_profile(&self, bus_address: u8) -> Result<MagCalibration> {
        Ok(self.find_mag_profile(bus_address)?.unwrap_or_default())
    }

    pub fn save_mag_profile(&self, bus_address: u8, cal: &MagCalibration) -> Result<()> {
        let path = self.mag_path(bus_address);
        write_record(&path, &MagRecord::from(cal))?;
        info!(?path, "Saved magnetometer calibration");
        Ok(())
    }

    /// Gyroscope bias and magnetometer calibration, identity where absent.
    pub fn load_profile(&self, bus_address: u8) -> Result<CalibrationProfile> {
        let gyro_bias = self.load_gyro_bias()?.unwrap_or_else(Vector3::zeros);
        let mag = self.load_mag_profile(bus_address)?;
        Ok(CalibrationProfile::new(gyro_bias, mag))
    }

    pub fn save_profile(&self, bus_address: u8, profile: &CalibrationProfile) -> Result<()> {
        self.save_gyro_bias(&profile.gyro_bias)?;
        self.save_mag_profile(bus_address, &profile.mag())
    }

    /// Manual magnetometer session: track extremes until `cancel` is raised,
    /// then derive and persist offset/scale for the transport's address.
    ///
    /// If no sample arrived before the stop, nothing is written and identity
    /// calibration is returned.
    pub fn calibrate_mag_interactive<T: SensorTransport + ?Sized>(
        &self,
        transport: &mut T,
        period: Duration,
        cancel: &AtomicBool,
    ) -> Result<MagCalibration> {
        let range = calibration::track_mag_range(transport, period, cancel)?;
        if range.is_empty() {
            warn!("Magnetometer calibration stopped before any sample, using defaults");
            return Ok(MagCalibration::default());
        }

        let cal = range.calibration();
        self.save_mag_profile(transport.bus_address(), &cal)?;
        Ok(cal)
    }

    /// Saved magnetometer calibration, or an interactive session if the
    /// address has none yet.
    pub fn load_or_calibrate_mag<T: SensorTransport + ?Sized>(
        &self,
        transport: &mut T,
        period: Duration,
        cancel: &AtomicBool,
    ) -> Result<MagCalibration> {
        let address = transport.bus_address();
        match self.find_mag_profile(address)? {
            Some(cal) => Ok(cal),
            None => {
                info!(address = %format!("0x{address:x}"), "No magnetometer calibration, starting session");
                self.calibrate_mag_interactive(transport, period, cancel)
            }
        }
    }
}

fn read_record<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&contents)?))
}

fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(record)?)?;
    Ok(())
}
