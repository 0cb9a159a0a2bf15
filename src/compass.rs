//! Tilt-compensated compass
//!
//! Roll and pitch come straight from the gravity direction; yaw comes from a
//! low-passed magnetometer vector rotated back onto the horizontal plane.
//! Nothing is integrated, so the estimate never drifts, but any linear
//! acceleration reads as tilt. No attempt is made to compensate for that.
//!
//! All vectors are in the (forward, right, up) body basis.

use nalgebra::Vector3;

use crate::estimator::{Attitude, BodySample, EstimationStrategy};

/// Roll and pitch in radians from a gravity (accelerometer) vector.
///
/// Pitch is positive nose-up, roll positive when the right side is raised.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use headtrack_fusion::compass::tilt_from_gravity;
///
/// let (roll, pitch) = tilt_from_gravity(&Vector3::new(0.0, 0.0, 9.81));
/// assert_eq!((roll, pitch), (0.0, 0.0));
/// ```
pub fn tilt_from_gravity(accel: &Vector3<f64>) -> (f64, f64) {
    let (a_fwd, a_right, a_up) = (accel.x, accel.y, accel.z);
    let pitch = a_fwd.atan2((a_right * a_right + a_up * a_up).sqrt());
    let roll = a_right.atan2(a_up);
    (roll, pitch)
}

/// Heading in radians of a magnetic vector observed at the given tilt.
///
/// The vector is de-rotated by -roll about the forward axis, then by -pitch
/// about the right axis, and the heading is read off the horizontal
/// components. Zero means forward points at magnetic north; positive is
/// clockwise seen from above.
pub fn tilt_compensated_heading(mag: &Vector3<f64>, roll: f64, pitch: f64) -> f64 {
    let (m_fwd, m_right, m_up) = (mag.x, mag.y, mag.z);
    let (sin_r, cos_r) = roll.sin_cos();
    let (sin_p, cos_p) = pitch.sin_cos();

    let right_flat = m_right * cos_r - m_up * sin_r;
    let up_unrolled = m_right * sin_r + m_up * cos_r;
    let fwd_flat = m_fwd * cos_p - up_unrolled * sin_p;

    (-right_flat).atan2(fwd_flat)
}

/// Compass strategy with a low-passed magnetic vector
#[derive(Debug, Clone)]
pub struct TiltCompass {
    use_magnetometer: bool,
    mag_alpha: f64,
    filtered_mag: Option<Vector3<f64>>,
}

impl TiltCompass {
    /// `mag_alpha` is the weight of each new magnetometer sample in the
    /// low-pass (0.02 keeps heading steady against sensor noise).
    pub fn new(use_magnetometer: bool, mag_alpha: f64) -> Self {
        Self {
            use_magnetometer,
            mag_alpha,
            filtered_mag: None,
        }
    }

    /// Current low-passed magnetic vector, once one sample has arrived.
    pub fn filtered_mag(&self) -> Option<Vector3<f64>> {
        self.filtered_mag
    }

    fn filter_mag(&mut self, mag: &Vector3<f64>) -> Vector3<f64> {
        let filtered = match self.filtered_mag {
            Some(previous) => previous * (1.0 - self.mag_alpha) + mag * self.mag_alpha,
            None => *mag,
        };
        self.filtered_mag = Some(filtered);
        filtered
    }
}

impl EstimationStrategy for TiltCompass {
    fn estimate(&mut self, body: &BodySample, _dt: f64) -> Attitude {
        let (roll, pitch) = tilt_from_gravity(&body.accel);

        let yaw = if self.use_magnetometer {
            let mag = self.filter_mag(&body.mag);
            tilt_compensated_heading(&mag, roll, pitch)
        } else {
            0.0
        };

        Attitude { roll, pitch, yaw }
    }

    fn name(&self) -> &'static str {
        "tilt-compass"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Body-frame gravity and magnetic readings for a head at the given
    /// heading, pitch and roll (radians), under a field with `north` and
    /// downward `dip` components.
    pub(crate) fn body_readings(
        heading: f64,
        pitch: f64,
        roll: f64,
        north: f64,
        dip: f64,
    ) -> (Vector3<f64>, Vector3<f64>) {
        // World frame: x north, y west, z up
        let n = Vector3::new(1.0, 0.0, 0.0);
        let e = Vector3::new(0.0, -1.0, 0.0);
        let up = Vector3::new(0.0, 0.0, 1.0);

        let f1 = n * heading.cos() + e * heading.sin();
        let r1 = -n * heading.sin() + e * heading.cos();

        let f2 = f1 * pitch.cos() + up * pitch.sin();
        let u2 = -f1 * pitch.sin() + up * pitch.cos();

        let r3 = r1 * roll.cos() + u2 * roll.sin();
        let u3 = -r1 * roll.sin() + u2 * roll.cos();
        let f3 = f2;

        let field = n * north - up * dip;
        let gravity = up * 9.81;
        let project = |v: Vector3<f64>| Vector3::new(v.dot(&f3), v.dot(&r3), v.dot(&u3));
        (project(gravity), project(field))
    }

    #[test]
    fn test_level_tilt() {
        let (roll, pitch) = tilt_from_gravity(&Vector3::new(0.0, 0.0, 9.81));
        assert!(roll.abs() < 1e-12 && pitch.abs() < 1e-12);
    }

    #[test]
    fn test_tilt_signs() {
        let (accel, _) = body_readings(0.0, 30f64.to_radians(), 0.0, 20.0, 40.0);
        let (roll, pitch) = tilt_from_gravity(&accel);
        assert!((pitch.to_degrees() - 30.0).abs() < 1e-9);
        assert!(roll.abs() < 1e-9);

        let (accel, _) = body_readings(0.0, 0.0, (-20f64).to_radians(), 20.0, 40.0);
        let (roll, pitch) = tilt_from_gravity(&accel);
        assert!((roll.to_degrees() + 20.0).abs() < 1e-9);
        assert!(pitch.abs() < 1e-9);
    }

    #[test]
    fn test_zero_gravity_is_finite() {
        let (roll, pitch) = tilt_from_gravity(&Vector3::zeros());
        assert!(roll.is_finite() && pitch.is_finite());
    }

    #[test]
    fn test_cardinal_headings() {
        for heading_deg in [0.0f64, 90.0, -90.0, 45.0, -135.0] {
            let (accel, mag) = body_readings(heading_deg.to_radians(), 0.0, 0.0, 20.0, 40.0);
            let (roll, pitch) = tilt_from_gravity(&accel);
            let heading = tilt_compensated_heading(&mag, roll, pitch).to_degrees();
            assert!(
                (heading - heading_deg).abs() < 1e-6,
                "expected {heading_deg}, got {heading}"
            );
        }

        let (accel, mag) = body_readings(std::f64::consts::PI, 0.0, 0.0, 20.0, 40.0);
        let (roll, pitch) = tilt_from_gravity(&accel);
        let heading = tilt_compensated_heading(&mag, roll, pitch).to_degrees();
        assert!((heading.abs() - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_heading_survives_tilt() {
        // Steep field inclination: an uncompensated compass would be
        // badly wrong at these angles
        for (pitch, roll) in [(30.0f64, 0.0f64), (-25.0, 15.0), (10.0, -40.0), (45.0, 30.0)] {
            for heading_deg in [0.0f64, 60.0, -120.0] {
                let (accel, mag) = body_readings(
                    heading_deg.to_radians(),
                    pitch.to_radians(),
                    roll.to_radians(),
                    20.0,
                    45.0,
                );
                let (r, p) = tilt_from_gravity(&accel);
                let heading = tilt_compensated_heading(&mag, r, p).to_degrees();
                assert!(
                    (heading - heading_deg).abs() < 1e-6,
                    "pitch {pitch} roll {roll}: expected {heading_deg}, got {heading}"
                );
            }
        }
    }

    #[test]
    fn test_magnetometer_disabled_holds_zero_yaw() {
        let mut compass = TiltCompass::new(false, 0.02);
        let (accel, mag) = body_readings(1.0, 0.2, 0.1, 20.0, 40.0);
        let sample = BodySample {
            accel,
            gyro: Vector3::zeros(),
            mag,
        };
        let attitude = compass.estimate(&sample, 0.01);
        assert_eq!(attitude.yaw, 0.0);
        assert!(compass.filtered_mag().is_none());
    }

    #[test]
    fn test_mag_low_pass() {
        let mut compass = TiltCompass::new(true, 0.02);
        let accel = Vector3::new(0.0, 0.0, 9.81);
        let first = BodySample {
            accel,
            gyro: Vector3::zeros(),
            mag: Vector3::new(20.0, 0.0, -40.0),
        };
        assert!(compass.estimate(&first, 0.01).yaw.abs() < 1e-12);

        // A sudden 90° jump only nudges the heading
        let jumped = BodySample {
            mag: Vector3::new(0.0, -20.0, -40.0),
            ..first
        };
        let yaw = compass.estimate(&jumped, 0.01).yaw.to_degrees();
        assert!(yaw > 0.0 && yaw < 2.0, "yaw {yaw}");

        let filtered = compass.filtered_mag().unwrap();
        assert!((filtered.x - 19.6).abs() < 1e-9);
        assert!((filtered.y + 0.4).abs() < 1e-9);
    }
}
