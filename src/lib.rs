//! Headtrack Fusion - head-tracking attitude estimation for AR glasses
//!
//! Fuses accelerometer, gyroscope and magnetometer samples from a
//! head-mounted IMU into smoothed roll, pitch and yaw. The IMU can be
//! mounted in any right-angle orientation; the wearer names the forward and
//! up sensor axes and everything else is derived from them.
//!
//! # Features
//!
//! - Mounting-agnostic forward/right/up body basis, with gravity-based up
//!   axis detection
//! - Three interchangeable estimators: a tilt-compensated compass, Madgwick
//!   quaternion fusion, and gyro yaw-rate integration with magnetic blending
//! - Gyroscope bias and magnetometer hard/soft-iron calibration, persisted
//!   per bus address, plus continuous online magnetometer calibration
//! - Exponential angle smoothing across the ±180° seam
//! - Relative-yaw mode with re-zeroing
//! - A fixed-cadence service loop over any [`SensorTransport`]
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use headtrack_fusion::{CalibrationProfile, EstimatorSettings, OrientationEstimator, RawSample};
//!
//! let settings = EstimatorSettings {
//!     forward_axis: "x".into(),
//!     up_axis: "z".into(),
//!     ..Default::default()
//! };
//! let mut estimator = OrientationEstimator::new(settings, CalibrationProfile::default()).unwrap();
//!
//! // Sensor readings
//! let accel = Vector3::new(0.0, 0.0, 9.81); // m/s²
//! let gyro = Vector3::new(0.0, 0.0, 0.0);   // rad/s
//! let mag = Vector3::new(20.0, 0.0, -40.0); // µT
//!
//! let orientation = estimator.update(&RawSample::new(accel, gyro, mag), 0.01); // 10ms
//! println!("roll {:.1}° pitch {:.1}° yaw {:.1}°", orientation.roll, orientation.pitch, orientation.yaw);
//! ```

mod ahrs;
pub mod axes;
pub mod calibration;
pub mod compass;
pub mod config;
mod error;
pub mod estimator;
mod gyro_yaw;
mod math;
pub mod service;
mod smoothing;
pub mod store;
pub mod transport;
mod types;

pub use ahrs::MadgwickAhrs;
pub use axes::{AxisDirection, AxisMap, Component, auto_detect_up, build_map, detect_mounting, parse_axis};
pub use calibration::{CalibrationProfile, MagCalibration, MagRange, OnlineMagCalibration};
pub use compass::TiltCompass;
pub use config::{ServiceConfig, load_config, save_config};
pub use error::{Error, Result, Sensor};
pub use estimator::{Attitude, BodySample, EstimationStrategy, OrientationEstimator};
pub use gyro_yaw::YawRateIntegrator;
pub use math::{DEG_TO_RAD, QuaternionExt, RAD_TO_DEG, Vector3Ext, wrap_degrees, wrap_radians};
pub use service::{OrientationService, ReadErrorPolicy};
pub use smoothing::{AngleSmoother, SmoothedAngles, smooth};
pub use store::CalibrationStore;
pub use transport::SensorTransport;
pub use types::*;
