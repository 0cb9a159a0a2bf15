//! Core value types and estimator settings

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One reading of all three sensors, in transport units
///
/// Accelerometer in m/s², gyroscope in rad/s, magnetometer in µT.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub accel: Vector3<f64>,
    pub gyro: Vector3<f64>,
    pub mag: Vector3<f64>,
}

impl RawSample {
    pub fn new(accel: Vector3<f64>, gyro: Vector3<f64>, mag: Vector3<f64>) -> Self {
        Self { accel, gyro, mag }
    }

    /// Whether every component of every vector is finite.
    pub fn is_finite(&self) -> bool {
        [self.accel, self.gyro, self.mag]
            .iter()
            .all(|v| v.iter().all(|c| c.is_finite()))
    }
}

/// Estimated head orientation emitted once per tick
///
/// Angles are in degrees within [-180, 180]. `angular_rate` is the
/// bias-corrected gyroscope vector in sensor axes, regardless of strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub angular_rate: Vector3<f64>,
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            angular_rate: Vector3::zeros(),
        }
    }
}

/// Estimation strategy
///
/// # Strategies
/// - **TiltCompass**: roll/pitch from gravity, yaw from a low-passed
///   tilt-compensated magnetometer. No gyroscope integration.
/// - **Madgwick**: gradient-descent quaternion fusion of gyroscope,
///   accelerometer and (optionally) magnetometer.
/// - **YawRate**: roll/pitch from gravity, yaw integrated from the Euler yaw
///   rate and pulled toward the magnetic heading when available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    TiltCompass,
    #[default]
    Madgwick,
    YawRate,
}

/// Construction-time estimator parameters
///
/// # Example
/// ```
/// use headtrack_fusion::{EstimatorSettings, Strategy};
///
/// let settings = EstimatorSettings {
///     strategy: Strategy::TiltCompass,
///     use_magnetometer: true,
///     forward_axis: "x".into(),
///     up_axis: "z".into(),
///     ..Default::default()
/// };
/// assert_eq!(settings.yaw_alpha, 0.2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorSettings {
    /// Which estimator runs each tick
    pub strategy: Strategy,
    /// Feed the gyroscope into the strategy (zero rate is used otherwise)
    pub use_gyro: bool,
    /// Use the magnetometer for yaw. When off, yaw is not an absolute heading.
    pub use_magnetometer: bool,
    /// Report yaw relative to the first tick's heading
    pub relative_yaw: bool,
    /// Sensor axis pointing out of the wearer's face, e.g. `-x`
    pub forward_axis: String,
    /// Sensor axis pointing up, e.g. `y`
    pub up_axis: String,
    /// Smoothing factor applied to roll and pitch (1 = no smoothing)
    pub roll_pitch_alpha: f64,
    /// Smoothing factor applied to yaw
    pub yaw_alpha: f64,
    /// Madgwick gradient step gain
    pub beta: f64,
    /// Low-pass factor for the magnetic vector used by the tilt compass
    pub mag_filter_alpha: f64,
    /// Weight of the magnetic heading in the yaw-rate strategy's blend
    pub yaw_mag_weight: f64,
    /// Tick period assumed when the measured one is unusable, in seconds
    pub nominal_dt: f64,
    /// Longest tick period fed to integrating strategies, in seconds
    pub max_dt: f64,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            use_gyro: true,
            use_magnetometer: false,
            relative_yaw: false,
            forward_axis: "-x".into(),
            up_axis: "y".into(),
            roll_pitch_alpha: 0.2,
            yaw_alpha: 0.2,
            beta: 0.05,
            mag_filter_alpha: 0.02,
            yaw_mag_weight: 0.02,
            nominal_dt: 0.01,
            max_dt: 0.1,
        }
    }
}

impl EstimatorSettings {
    /// Clamp a measured tick period into what the integrators accept.
    ///
    /// Non-positive or non-finite periods fall back to `nominal_dt`; long
    /// stalls are capped at `max_dt`.
    pub fn effective_dt(&self, dt: f64) -> f64 {
        if !dt.is_finite() || dt <= 0.0 {
            self.nominal_dt
        } else {
            dt.min(self.max_dt)
        }
    }
}
