//! Angle helpers and nalgebra extensions

use core::f64::consts::{FRAC_PI_2, PI, TAU};
use nalgebra::{UnitQuaternion, Vector3};

pub const DEG_TO_RAD: f64 = PI / 180.0;
pub const RAD_TO_DEG: f64 = 180.0 / PI;

/// Normalize an angle in degrees into [-180, 180].
///
/// Angles already inside the range are returned untouched, so both
/// -180 and 180 are fixed points.
pub fn wrap_degrees(angle: f64) -> f64 {
    if (-180.0..=180.0).contains(&angle) {
        angle
    } else {
        angle - 360.0 * (angle / 360.0).round()
    }
}

/// Normalize an angle in radians into [-π, π].
pub fn wrap_radians(angle: f64) -> f64 {
    if (-PI..=PI).contains(&angle) {
        angle
    } else {
        angle - TAU * (angle / TAU).round()
    }
}

/// Keep a divisor at least `epsilon` away from zero, preserving its sign.
pub fn clamp_magnitude_min(value: f64, epsilon: f64) -> f64 {
    if value.abs() >= epsilon {
        value
    } else if value < 0.0 {
        -epsilon
    } else {
        epsilon
    }
}

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Normalize the vector, returning zero vector if magnitude is zero
    fn safe_normalize(&self) -> Vector3<f64>;

    /// Convert degrees to radians
    fn deg_to_rad(&self) -> Vector3<f64>;

    /// Convert radians to degrees
    fn rad_to_deg(&self) -> Vector3<f64>;
}

impl Vector3Ext for Vector3<f64> {
    fn safe_normalize(&self) -> Vector3<f64> {
        let mag = self.norm();
        if mag > 0.0 { *self / mag } else { Vector3::zeros() }
    }

    fn deg_to_rad(&self) -> Vector3<f64> {
        *self * DEG_TO_RAD
    }

    fn rad_to_deg(&self) -> Vector3<f64> {
        *self * RAD_TO_DEG
    }
}

/// Extension trait for UnitQuaternion operations
pub trait QuaternionExt {
    /// Aerospace (ZYX) roll, pitch, yaw in radians.
    ///
    /// Pitch is pinned to ±90° when the arcsine argument saturates.
    fn roll_pitch_yaw(&self) -> (f64, f64, f64);
}

impl QuaternionExt for UnitQuaternion<f64> {
    fn roll_pitch_yaw(&self) -> (f64, f64, f64) {
        let q = self.as_ref();
        let (w, x, y, z) = (q.w, q.i, q.j, q.k);

        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));

        let sin_pitch = 2.0 * (w * y - z * x);
        let pitch = if sin_pitch.abs() >= 1.0 {
            FRAC_PI_2.copysign(sin_pitch)
        } else {
            sin_pitch.asin()
        };

        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));

        (roll, pitch, yaw)
    }
}
