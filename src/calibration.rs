//! Gyroscope bias and magnetometer hard/soft-iron calibration
//!
//! Corrections are applied per axis:
//!
//! - gyroscope: `raw - bias`
//! - magnetometer: `(raw - hard_iron_offset) * soft_iron_scale`
//!
//! The magnetometer terms come from the per-axis extremes seen while the
//! sensor is rotated through many orientations: the centre of the range is
//! the hard-iron offset, and each axis is scaled so that all three ranges
//! match their mean.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use nalgebra::Vector3;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::transport::{SensorTransport, collect};

/// Magnetometer hard-iron offset and soft-iron scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagCalibration {
    pub offset: Vector3<f64>,
    pub scale: Vector3<f64>,
}

impl Default for MagCalibration {
    fn default() -> Self {
        Self {
            offset: Vector3::zeros(),
            scale: Vector3::repeat(1.0),
        }
    }
}

impl MagCalibration {
    /// Apply hard-iron then soft-iron correction.
    ///
    /// # Example
    /// ```
    /// use nalgebra::Vector3;
    /// use headtrack_fusion::MagCalibration;
    ///
    /// let cal = MagCalibration {
    ///     offset: Vector3::new(10.0, 20.0, 30.0),
    ///     scale: Vector3::new(1.0, 2.0, 0.5),
    /// };
    /// let corrected = cal.apply(&Vector3::new(100.0, 200.0, 300.0));
    /// assert_eq!(corrected, Vector3::new(90.0, 360.0, 135.0));
    /// ```
    #[inline]
    pub fn apply(&self, raw: &Vector3<f64>) -> Vector3<f64> {
        (raw - self.offset).component_mul(&self.scale)
    }
}

/// Full per-session calibration
///
/// Absent records fall back to identity (zero bias, zero offset, unit
/// scale) so an uncalibrated device still runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationProfile {
    pub gyro_bias: Vector3<f64>,
    pub mag_offset: Vector3<f64>,
    pub mag_scale: Vector3<f64>,
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        let mag = MagCalibration::default();
        Self {
            gyro_bias: Vector3::zeros(),
            mag_offset: mag.offset,
            mag_scale: mag.scale,
        }
    }
}

impl CalibrationProfile {
    pub fn new(gyro_bias: Vector3<f64>, mag: MagCalibration) -> Self {
        Self {
            gyro_bias,
            mag_offset: mag.offset,
            mag_scale: mag.scale,
        }
    }

    pub fn mag(&self) -> MagCalibration {
        MagCalibration {
            offset: self.mag_offset,
            scale: self.mag_scale,
        }
    }

    pub fn set_mag(&mut self, mag: MagCalibration) {
        self.mag_offset = mag.offset;
        self.mag_scale = mag.scale;
    }

    #[inline]
    pub fn correct_gyro(&self, raw: &Vector3<f64>) -> Vector3<f64> {
        raw - self.gyro_bias
    }

    #[inline]
    pub fn correct_mag(&self, raw: &Vector3<f64>) -> Vector3<f64> {
        self.mag().apply(raw)
    }
}

/// Running per-axis magnetometer extremes
///
/// Starts empty and only ever widens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagRange {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Default for MagRange {
    fn default() -> Self {
        Self::new()
    }
}

impl MagRange {
    /// An empty range; the first sample sets both extremes.
    pub fn new() -> Self {
        Self {
            min: Vector3::repeat(f64::INFINITY),
            max: Vector3::repeat(f64::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    /// Widen the range to cover `sample`. Returns whether anything moved.
    ///
    /// Samples with a non-finite component are ignored.
    pub fn include(&mut self, sample: &Vector3<f64>) -> bool {
        if !sample.iter().all(|c| c.is_finite()) {
            return false;
        }

        let mut changed = false;
        for i in 0..3 {
            if sample[i] < self.min[i] {
                self.min[i] = sample[i];
                changed = true;
            }
            if sample[i] > self.max[i] {
                self.max[i] = sample[i];
                changed = true;
            }
        }
        changed
    }

    /// Per-axis `max - min`, zero while empty.
    pub fn span(&self) -> Vector3<f64> {
        if self.is_empty() {
            Vector3::zeros()
        } else {
            self.max - self.min
        }
    }

    /// Hard-iron offset at the centre of the range.
    pub fn center(&self) -> Vector3<f64> {
        if self.is_empty() {
            Vector3::zeros()
        } else {
            (self.min + self.max) / 2.0
        }
    }

    /// Soft-iron scale `mean_span / span` per axis, or `None` while the
    /// mean span is zero. Axes that have not moved keep a scale of 1.
    pub fn scale(&self) -> Option<Vector3<f64>> {
        let span = self.span();
        let mean = span.sum() / 3.0;
        if mean <= 0.0 {
            return None;
        }
        Some(span.map(|s| if s > 0.0 { mean / s } else { 1.0 }))
    }

    /// Offset and scale derived from the range.
    pub fn calibration(&self) -> MagCalibration {
        MagCalibration {
            offset: self.center(),
            scale: self.scale().unwrap_or_else(|| Vector3::repeat(1.0)),
        }
    }
}

/// Continuous magnetometer calibration fed from live samples
///
/// Every sample widens the tracked range; offset and scale are recomputed
/// whenever it moved. Nothing decays, so a single early outlier stays in
/// the range for the life of the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnlineMagCalibration {
    range: MagRange,
    current: MagCalibration,
    updates: u64,
}

impl OnlineMagCalibration {
    /// Start from an empty range, reporting `initial` until the first sample.
    pub fn new(initial: MagCalibration) -> Self {
        Self {
            range: MagRange::new(),
            current: initial,
            updates: 0,
        }
    }

    /// Fold in a raw sample. Returns whether the calibration changed.
    pub fn update(&mut self, raw_mag: &Vector3<f64>) -> bool {
        if !self.range.include(raw_mag) {
            return false;
        }

        self.updates += 1;
        self.current.offset = self.range.center();
        if let Some(scale) = self.range.scale() {
            self.current.scale = scale;
        }
        debug!(
            updates = self.updates,
            offset_x = self.current.offset.x,
            offset_y = self.current.offset.y,
            offset_z = self.current.offset.z,
            "Magnetometer range widened"
        );
        true
    }

    pub fn calibration(&self) -> MagCalibration {
        self.current
    }

    pub fn range(&self) -> &MagRange {
        &self.range
    }

    /// Number of samples that widened the range.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Forget the tracked range. Only an operator should call this.
    pub fn reset(&mut self) {
        self.range = MagRange::new();
        self.updates = 0;
    }
}

/// Mean of a set of vectors.
pub fn mean(samples: &[Vector3<f64>]) -> Result<Vector3<f64>> {
    if samples.is_empty() {
        return Err(Error::NoSamples);
    }
    let sum: Vector3<f64> = samples.iter().sum();
    Ok(sum / samples.len() as f64)
}

/// Average `count` gyroscope readings taken `period` apart.
///
/// The caller must keep the device still; no motion detection is done.
pub fn estimate_gyro_bias<T: SensorTransport + ?Sized>(
    transport: &mut T,
    count: usize,
    period: Duration,
    cancel: &AtomicBool,
) -> Result<Vector3<f64>> {
    info!(count, "Calibrating gyroscope, keep the sensor still");
    let step = (count / 10).max(1);
    let samples = collect(count, period, cancel, |i| {
        if i % step == 0 {
            debug!(progress = i * 100 / count.max(1), "Gyroscope calibration");
        }
        transport.read_gyro()
    })?;
    let bias = mean(&samples)?;
    info!(bias_x = bias.x, bias_y = bias.y, bias_z = bias.z, "Gyroscope calibration complete");
    Ok(bias)
}

/// Track magnetometer extremes until `cancel` is raised.
///
/// This is the manual "rotate through every orientation" session. The
/// operator raises `cancel` (e.g. from a Ctrl-C handler) to finish.
pub fn track_mag_range<T: SensorTransport + ?Sized>(
    transport: &mut T,
    period: Duration,
    cancel: &AtomicBool,
) -> Result<MagRange> {
    info!("Rotate the sensor in a figure-eight through all directions; stop to save");
    let mut range = MagRange::new();
    let mut samples: u64 = 0;

    while !cancel.load(Ordering::Relaxed) {
        let raw = transport.read_mag()?;
        if range.include(&raw) {
            debug!(
                min_x = range.min.x,
                max_x = range.max.x,
                min_y = range.min.y,
                max_y = range.max.y,
                min_z = range.min.z,
                max_z = range.max.z,
                "Magnetometer range"
            );
        }
        samples += 1;
        if !period.is_zero() {
            thread::sleep(period);
        }
    }

    info!(samples, "Magnetometer calibration finished");
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f64::consts::PI;

    #[test]
    fn test_gyro_correction() {
        let profile = CalibrationProfile {
            gyro_bias: Vector3::new(0.1, -0.2, 0.3),
            ..Default::default()
        };
        let corrected = profile.correct_gyro(&Vector3::new(0.1, -0.2, 0.3));
        assert!(corrected.norm() < 1e-12);
    }

    #[test]
    fn test_identity_profile() {
        let profile = CalibrationProfile::default();
        let raw = Vector3::new(12.0, -30.0, 44.0);
        assert_eq!(profile.correct_mag(&raw), raw);
        assert_eq!(profile.correct_gyro(&raw), raw);
    }

    #[test]
    fn test_range_widens_only() {
        let mut range = MagRange::new();
        assert!(range.is_empty());
        assert_eq!(range.span(), Vector3::zeros());

        assert!(range.include(&Vector3::new(1.0, 2.0, 3.0)));
        assert!(!range.is_empty());
        assert!(!range.include(&Vector3::new(1.0, 2.0, 3.0)));

        assert!(range.include(&Vector3::new(-1.0, 2.0, 5.0)));
        assert_eq!(range.min, Vector3::new(-1.0, 2.0, 3.0));
        assert_eq!(range.max, Vector3::new(1.0, 2.0, 5.0));

        // Inside the range: nothing moves
        assert!(!range.include(&Vector3::new(0.0, 2.0, 4.0)));
    }

    #[test]
    fn test_range_ignores_non_finite() {
        let mut range = MagRange::new();
        assert!(!range.include(&Vector3::new(f64::NAN, 0.0, 0.0)));
        assert!(range.is_empty());
    }

    #[test]
    fn test_range_calibration() {
        let mut range = MagRange::new();
        range.include(&Vector3::new(-10.0, 0.0, 10.0));
        range.include(&Vector3::new(30.0, 20.0, 50.0));
        // spans: 40, 20, 40 → mean 33.33
        let cal = range.calibration();
        assert_eq!(cal.offset, Vector3::new(10.0, 10.0, 30.0));
        let mean = 100.0 / 3.0;
        assert!((cal.scale.x - mean / 40.0).abs() < 1e-12);
        assert!((cal.scale.y - mean / 20.0).abs() < 1e-12);
        assert!((cal.scale.z - mean / 40.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_axis_keeps_unit_scale() {
        let mut range = MagRange::new();
        range.include(&Vector3::new(-10.0, 5.0, 0.0));
        range.include(&Vector3::new(10.0, 5.0, 20.0));
        let scale = range.scale().unwrap();
        assert_eq!(scale.y, 1.0);
        assert!(range.scale().is_some());
        assert!(MagRange::new().scale().is_none());
    }

    #[test]
    fn test_online_first_sample_keeps_scale() {
        let initial = MagCalibration {
            offset: Vector3::zeros(),
            scale: Vector3::new(1.1, 0.9, 1.0),
        };
        let mut online = OnlineMagCalibration::new(initial);
        assert!(online.update(&Vector3::new(20.0, 5.0, -40.0)));
        let cal = online.calibration();
        assert_eq!(cal.offset, Vector3::new(20.0, 5.0, -40.0));
        assert_eq!(cal.scale, initial.scale);
        assert_eq!(online.updates(), 1);
    }

    #[test]
    fn test_online_converges_on_sphere() {
        let bias = Vector3::new(12.0, -7.5, 30.0);
        let radius = 48.0;
        let mut online = OnlineMagCalibration::default();
        let mut last_span = Vector3::zeros();

        for i in 0..=36 {
            let polar = PI * i as f64 / 36.0;
            for j in 0..72 {
                let azimuth = 2.0 * PI * j as f64 / 72.0;
                let direction = Vector3::new(
                    polar.sin() * azimuth.cos(),
                    polar.sin() * azimuth.sin(),
                    polar.cos(),
                );
                online.update(&(bias + direction * radius));

                let span = online.range().span();
                assert!(span.x >= last_span.x && span.y >= last_span.y && span.z >= last_span.z);
                last_span = span;
            }
        }

        let cal = online.calibration();
        assert!((cal.offset - bias).norm() < 0.1, "offset {:?}", cal.offset);
        for s in cal.scale.iter() {
            assert!((s - 1.0).abs() < 0.01, "scale {:?}", cal.scale);
        }
    }

    #[test]
    fn test_online_reset() {
        let mut online = OnlineMagCalibration::default();
        online.update(&Vector3::new(1.0, 1.0, 1.0));
        online.reset();
        assert!(online.range().is_empty());
        assert_eq!(online.updates(), 0);
    }

    #[test]
    fn test_mean() {
        let samples = [Vector3::new(1.0, 2.0, 3.0), Vector3::new(3.0, 2.0, 1.0)];
        assert_eq!(mean(&samples).unwrap(), Vector3::new(2.0, 2.0, 2.0));
        assert!(matches!(mean(&[]), Err(Error::NoSamples)));
    }
}
