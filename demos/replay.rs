//! Replay a recorded IMU log through the estimator
//!
//! The log is a CSV with a time column and raw accelerometer (m/s²),
//! gyroscope (rad/s) and magnetometer (µT) columns in sensor axes. Each row
//! is fed with the Δt between its timestamp and the previous one.
//!
//! Run with: `cargo run --example replay -- [log.csv] [config.toml] [bus address]`
//!
//! The bus address (e.g. `0x1e`) picks the magnetometer calibration file and
//! defaults to `0x1c`.

use std::error::Error;
use std::path::Path;

use headtrack_fusion::{CalibrationProfile, CalibrationStore, OrientationEstimator, RawSample, load_config};
use nalgebra::Vector3;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG: &str = "demos/data/head_motion.csv";
const DEFAULT_ADDRESS: u8 = 0x1c;

fn parse_address(arg: &str) -> Result<u8, std::num::ParseIntError> {
    match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => arg.parse(),
    }
}

#[derive(Debug, Deserialize)]
struct LogRow {
    #[serde(rename = "Time (s)")]
    time: f64,
    #[serde(rename = "Accelerometer X (m/s^2)")]
    accel_x: f64,
    #[serde(rename = "Accelerometer Y (m/s^2)")]
    accel_y: f64,
    #[serde(rename = "Accelerometer Z (m/s^2)")]
    accel_z: f64,
    #[serde(rename = "Gyroscope X (rad/s)")]
    gyro_x: f64,
    #[serde(rename = "Gyroscope Y (rad/s)")]
    gyro_y: f64,
    #[serde(rename = "Gyroscope Z (rad/s)")]
    gyro_z: f64,
    #[serde(rename = "Magnetometer X (uT)")]
    mag_x: f64,
    #[serde(rename = "Magnetometer Y (uT)")]
    mag_y: f64,
    #[serde(rename = "Magnetometer Z (uT)")]
    mag_z: f64,
}

impl LogRow {
    fn sample(&self) -> RawSample {
        RawSample::new(
            Vector3::new(self.accel_x, self.accel_y, self.accel_z),
            Vector3::new(self.gyro_x, self.gyro_y, self.gyro_z),
            Vector3::new(self.mag_x, self.mag_y, self.mag_z),
        )
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let log_path = args.next().unwrap_or_else(|| DEFAULT_LOG.to_string());
    let config = match args.next() {
        Some(path) => load_config(Path::new(&path))?,
        None => Default::default(),
    };
    let address = match args.next() {
        Some(arg) => parse_address(&arg)?,
        None => DEFAULT_ADDRESS,
    };

    // Saved calibration is optional for replays
    let store = CalibrationStore::new(&config.calibration_dir);
    let profile = store.load_profile(address).unwrap_or_else(|err| {
        warn!(%err, address = %format!("0x{address:x}"), "Ignoring unreadable calibration");
        CalibrationProfile::default()
    });

    let mut estimator = OrientationEstimator::new(config.estimator.clone(), profile)?;
    info!(log = %log_path, strategy = estimator.strategy_name(), "Replaying");

    let mut reader = csv::Reader::from_path(&log_path)?;
    let mut previous_time = None;
    let mut rows = 0usize;

    for result in reader.deserialize() {
        let row: LogRow = result?;
        let dt = previous_time.map_or(0.0, |previous| row.time - previous);
        previous_time = Some(row.time);

        let orientation = estimator.update(&row.sample(), dt);
        rows += 1;
        if rows % 50 == 0 {
            println!(
                "t={:6.2}s  roll {:7.2}°  pitch {:7.2}°  yaw {:7.2}°",
                row.time, orientation.roll, orientation.pitch, orientation.yaw
            );
        }
    }

    let last = estimator.last();
    println!(
        "{rows} samples ({} skipped). Final: roll {:.2}°, pitch {:.2}°, yaw {:.2}°",
        estimator.skipped_ticks(),
        last.roll,
        last.pitch,
        last.yaw
    );
    Ok(())
}
