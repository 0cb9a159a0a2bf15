//! Per-tick orientation pipeline
//!
//! Every tick runs the same stages whichever strategy is selected:
//!
//! 1. reject non-finite samples
//! 2. apply the gyroscope bias and magnetometer offset/scale
//! 3. project all three vectors onto the forward/right/up basis
//! 4. run the strategy to get raw roll, pitch and yaw
//! 5. subtract the relative-yaw reference, if enabled
//! 6. smooth each angle across the ±180° seam

use nalgebra::Vector3;
use tracing::{debug, warn};

use crate::ahrs::MadgwickAhrs;
use crate::axes::AxisMap;
use crate::calibration::{CalibrationProfile, MagCalibration};
use crate::compass::TiltCompass;
use crate::error::Result;
use crate::gyro_yaw::YawRateIntegrator;
use crate::math::{RAD_TO_DEG, wrap_degrees};
use crate::smoothing::{AngleSmoother, SmoothedAngles};
use crate::types::{EstimatorSettings, Orientation, RawSample, Strategy};

/// Calibrated sensor vectors in the (forward, right, up) basis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodySample {
    pub accel: Vector3<f64>,
    /// rad/s; zero when the gyroscope is disabled
    pub gyro: Vector3<f64>,
    pub mag: Vector3<f64>,
}

/// Unsmoothed attitude in radians
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// One way of turning body-frame samples into roll, pitch and yaw
///
/// Sign conventions shared by every implementation: pitch is positive
/// nose-up, roll positive with the right side raised, yaw positive
/// clockwise seen from above.
pub trait EstimationStrategy: Send {
    /// Advance the strategy's state by one tick of `dt` seconds.
    fn estimate(&mut self, body: &BodySample, dt: f64) -> Attitude;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Build the strategy selected in `settings`.
pub fn build_strategy(settings: &EstimatorSettings) -> Box<dyn EstimationStrategy> {
    match settings.strategy {
        Strategy::TiltCompass => Box::new(TiltCompass::new(
            settings.use_magnetometer,
            settings.mag_filter_alpha,
        )),
        Strategy::Madgwick => Box::new(MadgwickAhrs::new(settings.beta, settings.use_magnetometer)),
        Strategy::YawRate => Box::new(YawRateIntegrator::new(
            settings.use_magnetometer,
            settings.yaw_mag_weight,
        )),
    }
}

/// Stateful estimator producing one [`Orientation`] per sample
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use headtrack_fusion::{CalibrationProfile, EstimatorSettings, OrientationEstimator, RawSample, Strategy};
///
/// let settings = EstimatorSettings {
///     strategy: Strategy::TiltCompass,
///     forward_axis: "x".into(),
///     up_axis: "z".into(),
///     roll_pitch_alpha: 1.0,
///     ..Default::default()
/// };
/// let mut estimator = OrientationEstimator::new(settings, CalibrationProfile::default()).unwrap();
///
/// let level = RawSample::new(Vector3::new(0.0, 0.0, 9.81), Vector3::zeros(), Vector3::x());
/// let orientation = estimator.update(&level, 0.01);
/// assert!(orientation.pitch.abs() < 1e-9);
/// ```
pub struct OrientationEstimator {
    settings: EstimatorSettings,
    axes: AxisMap,
    calibration: CalibrationProfile,
    strategy: Box<dyn EstimationStrategy>,
    smoother: AngleSmoother,
    smoothed: SmoothedAngles,
    /// Raw yaw in degrees captured on the first tick in relative mode
    yaw_reference: Option<f64>,
    last: Orientation,
    ticks: u64,
    skipped: u64,
}

impl OrientationEstimator {
    /// Estimator running the strategy named in `settings`.
    ///
    /// Fails if the forward/up axis names are invalid or parallel.
    pub fn new(settings: EstimatorSettings, calibration: CalibrationProfile) -> Result<Self> {
        let strategy = build_strategy(&settings);
        Self::with_strategy(settings, calibration, strategy)
    }

    /// Estimator running a caller-supplied strategy; `settings.strategy` is
    /// ignored.
    pub fn with_strategy(
        settings: EstimatorSettings,
        calibration: CalibrationProfile,
        strategy: Box<dyn EstimationStrategy>,
    ) -> Result<Self> {
        let axes = AxisMap::from_names(&settings.forward_axis, &settings.up_axis)?;
        let smoother = AngleSmoother::new(settings.roll_pitch_alpha, settings.yaw_alpha);
        debug!(
            strategy = strategy.name(),
            forward = %axes.forward_axis(),
            up = %axes.up_axis(),
            "Estimator ready"
        );
        Ok(Self {
            settings,
            axes,
            calibration,
            strategy,
            smoother,
            smoothed: SmoothedAngles::default(),
            yaw_reference: None,
            last: Orientation::default(),
            ticks: 0,
            skipped: 0,
        })
    }

    /// Fold one raw sample into the estimate.
    ///
    /// `dt` is the time since the previous sample in seconds; unusable
    /// values fall back to the nominal period. A sample containing NaN or
    /// infinity is skipped and the previous orientation returned unchanged.
    pub fn update(&mut self, raw: &RawSample, dt: f64) -> Orientation {
        if !raw.is_finite() {
            self.skipped += 1;
            warn!(skipped = self.skipped, "Non-finite sensor sample, skipping tick");
            return self.last;
        }

        let angular_rate = self.calibration.correct_gyro(&raw.gyro);
        let body = BodySample {
            accel: self.axes.map(&raw.accel),
            gyro: if self.settings.use_gyro {
                self.axes.map(&angular_rate)
            } else {
                Vector3::zeros()
            },
            mag: self.axes.map(&self.calibration.correct_mag(&raw.mag)),
        };

        let dt = self.settings.effective_dt(dt);
        let attitude = self.strategy.estimate(&body, dt);

        let roll = attitude.roll * RAD_TO_DEG;
        let pitch = attitude.pitch * RAD_TO_DEG;
        let mut yaw = attitude.yaw * RAD_TO_DEG;

        if self.settings.relative_yaw {
            let reference = *self.yaw_reference.get_or_insert(yaw);
            yaw = wrap_degrees(yaw - reference);
        }

        self.smoother.apply(&mut self.smoothed, roll, pitch, yaw);
        self.ticks += 1;

        self.last = Orientation {
            roll: self.smoothed.roll,
            pitch: self.smoothed.pitch,
            yaw: self.smoothed.yaw,
            angular_rate,
        };
        self.last
    }

    /// Swap in new magnetometer offset/scale (e.g. from online calibration).
    pub fn set_mag_calibration(&mut self, mag: MagCalibration) {
        self.calibration.set_mag(mag);
    }

    pub fn set_gyro_bias(&mut self, bias: Vector3<f64>) {
        self.calibration.gyro_bias = bias;
    }

    /// Re-capture the relative-yaw reference on the next tick.
    ///
    /// Has no effect unless relative yaw is enabled.
    pub fn rezero_yaw(&mut self) {
        if self.settings.relative_yaw {
            debug!("Relative yaw reference cleared");
            self.yaw_reference = None;
        }
    }

    /// Samples rejected for containing non-finite values.
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped
    }

    /// Samples successfully folded into the estimate.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Most recent output.
    pub fn last(&self) -> Orientation {
        self.last
    }

    pub fn settings(&self) -> &EstimatorSettings {
        &self.settings
    }

    pub fn axes(&self) -> &AxisMap {
        &self.axes
    }

    pub fn calibration(&self) -> &CalibrationProfile {
        &self.calibration
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}

impl core::fmt::Debug for OrientationEstimator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OrientationEstimator")
            .field("strategy", &self.strategy.name())
            .field("axes", &self.axes)
            .field("last", &self.last)
            .field("ticks", &self.ticks)
            .field("skipped", &self.skipped)
            .finish()
    }
}
