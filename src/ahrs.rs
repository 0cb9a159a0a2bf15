//! Gyro-integrating quaternion fusion (Madgwick gradient descent)
//!
//! The gyroscope drives the quaternion; each tick a normalized gradient
//! step of size `beta` pulls it toward agreement with gravity and, when
//! enabled, the magnetic field. Without the magnetometer yaw is gyro-only
//! and drifts slowly with any residual bias.
//!
//! The filter runs in a right-handed forward-left-up frame. The incoming
//! (forward, right, up) basis is left-handed, so the right component is
//! flipped on the way in, and the extracted angles are negated on the way
//! out to match the compass conventions (nose-up pitch, right-side-up roll,
//! clockwise yaw all positive).

use nalgebra::{Matrix3x4, Quaternion, UnitQuaternion, Vector3, Vector4};

use crate::compass::{tilt_compensated_heading, tilt_from_gravity};
use crate::estimator::{Attitude, BodySample, EstimationStrategy};
use crate::math::QuaternionExt;

/// Madgwick fusion state
#[derive(Debug, Clone)]
pub struct MadgwickAhrs {
    /// Gradient step gain
    beta: f64,
    /// Fuse the magnetometer into the correction step
    use_magnetometer: bool,
    /// Body-to-earth orientation in the forward-left-up frame
    quaternion: UnitQuaternion<f64>,
    /// Whether the quaternion has been initialised from a sample
    seeded: bool,
}

impl MadgwickAhrs {
    pub fn new(beta: f64, use_magnetometer: bool) -> Self {
        Self {
            beta,
            use_magnetometer,
            quaternion: UnitQuaternion::identity(),
            seeded: false,
        }
    }

    /// Get current orientation quaternion (forward-left-up frame)
    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        self.quaternion
    }

    /// Set orientation quaternion directly; disables first-sample seeding
    pub fn set_quaternion(&mut self, quaternion: UnitQuaternion<f64>) {
        self.quaternion = quaternion;
        self.seeded = true;
    }

    /// Forget the orientation; the next sample seeds it again.
    pub fn reset(&mut self) {
        self.quaternion = UnitQuaternion::identity();
        self.seeded = false;
    }

    /// Initialise from the gravity direction (and heading, if enabled) so
    /// the filter starts where the sensors already agree.
    fn seed(&mut self, body: &BodySample) {
        let (roll, pitch) = tilt_from_gravity(&body.accel);
        let yaw = if self.use_magnetometer && body.mag.norm() > 0.0 {
            tilt_compensated_heading(&body.mag, roll, pitch)
        } else {
            0.0
        };
        self.quaternion = UnitQuaternion::from_euler_angles(-roll, -pitch, -yaw);
        self.seeded = true;
    }

    /// One filter step with forward-left-up inputs. `gyroscope` in rad/s.
    fn step(
        &mut self,
        gyroscope: Vector3<f64>,
        accelerometer: Vector3<f64>,
        magnetometer: Option<Vector3<f64>>,
        delta_time: f64,
    ) {
        let q = *self.quaternion.as_ref();

        // Rate of change from the gyroscope: dq/dt = 0.5 * q * ω
        let mut q_dot = q * Quaternion::from_imag(gyroscope) * 0.5;

        if accelerometer.norm() > 0.0 {
            let magnetometer = magnetometer
                .filter(|m| m.norm() > 0.0)
                .map(|m| m.normalize());
            let gradient = self.gradient(accelerometer.normalize(), magnetometer);
            let norm = gradient.norm();
            if norm > 0.0 {
                let step = gradient / norm;
                q_dot -= Quaternion::new(step[0], step[1], step[2], step[3]) * self.beta;
            }
        }

        self.quaternion = UnitQuaternion::from_quaternion(q + q_dot * delta_time);
    }

    /// Objective-function gradient J^T f in (w, x, y, z) order.
    fn gradient(&self, accel: Vector3<f64>, mag: Option<Vector3<f64>>) -> Vector4<f64> {
        let q = self.quaternion.as_ref();
        let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);

        // Predicted gravity minus measured
        let f_g = Vector3::new(
            2.0 * (q1 * q3 - q0 * q2) - accel.x,
            2.0 * (q0 * q1 + q2 * q3) - accel.y,
            2.0 * (0.5 - q1 * q1 - q2 * q2) - accel.z,
        );
        #[rustfmt::skip]
        let j_g = Matrix3x4::new(
            -2.0 * q2, 2.0 * q3, -2.0 * q0, 2.0 * q1,
            2.0 * q1, 2.0 * q0, 2.0 * q3, 2.0 * q2,
            0.0, -4.0 * q1, -4.0 * q2, 0.0,
        );
        let mut gradient = j_g.transpose() * f_g;

        if let Some(mag) = mag {
            // Earth-frame field reduced to north and vertical components
            let h = self.quaternion * mag;
            let bx = (h.x * h.x + h.y * h.y).sqrt();
            let bz = h.z;

            let f_b = Vector3::new(
                2.0 * bx * (0.5 - q2 * q2 - q3 * q3) + 2.0 * bz * (q1 * q3 - q0 * q2) - mag.x,
                2.0 * bx * (q1 * q2 - q0 * q3) + 2.0 * bz * (q0 * q1 + q2 * q3) - mag.y,
                2.0 * bx * (q0 * q2 + q1 * q3) + 2.0 * bz * (0.5 - q1 * q1 - q2 * q2) - mag.z,
            );
            #[rustfmt::skip]
            let j_b = Matrix3x4::new(
                -2.0 * bz * q2,
                2.0 * bz * q3,
                -4.0 * bx * q2 - 2.0 * bz * q0,
                -4.0 * bx * q3 + 2.0 * bz * q1,

                -2.0 * bx * q3 + 2.0 * bz * q1,
                2.0 * bx * q2 + 2.0 * bz * q0,
                2.0 * bx * q1 + 2.0 * bz * q3,
                -2.0 * bx * q0 + 2.0 * bz * q2,

                2.0 * bx * q2,
                2.0 * bx * q3 - 4.0 * bz * q1,
                2.0 * bx * q0 - 4.0 * bz * q2,
                2.0 * bx * q1,
            );
            gradient += j_b.transpose() * f_b;
        }

        gradient
    }
}

/// (forward, right, up) → (forward, left, up)
#[inline]
fn to_forward_left_up(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.x, -v.y, v.z)
}

impl EstimationStrategy for MadgwickAhrs {
    fn estimate(&mut self, body: &BodySample, dt: f64) -> Attitude {
        if !self.seeded {
            self.seed(body);
        } else {
            let magnetometer = self.use_magnetometer.then(|| to_forward_left_up(&body.mag));
            self.step(
                to_forward_left_up(&body.gyro),
                to_forward_left_up(&body.accel),
                magnetometer,
                dt,
            );
        }

        let (roll, pitch, yaw) = self.quaternion.roll_pitch_yaw();
        Attitude {
            roll: -roll,
            pitch: -pitch,
            yaw: -yaw,
        }
    }

    fn name(&self) -> &'static str {
        "madgwick"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compass::tests::body_readings;

    fn still(accel: Vector3<f64>, mag: Vector3<f64>) -> BodySample {
        BodySample {
            accel,
            gyro: Vector3::zeros(),
            mag,
        }
    }

    fn angle_to_identity(q: &UnitQuaternion<f64>) -> f64 {
        q.angle_to(&UnitQuaternion::identity()).to_degrees()
    }

    #[test]
    fn test_new_ahrs() {
        let ahrs = MadgwickAhrs::new(0.05, true);
        assert_eq!(ahrs.quaternion(), UnitQuaternion::identity());
    }

    #[test]
    fn test_level_seed_is_identity() {
        let mut ahrs = MadgwickAhrs::new(0.05, true);
        let (accel, mag) = body_readings(0.0, 0.0, 0.0, 20.0, 40.0);
        let attitude = ahrs.estimate(&still(accel, mag), 0.01);
        assert!(angle_to_identity(&ahrs.quaternion()) < 1e-6);
        assert!(attitude.roll.abs() < 1e-9 && attitude.pitch.abs() < 1e-9 && attitude.yaw.abs() < 1e-9);
    }

    #[test]
    fn test_seed_matches_compass_conventions() {
        let mut ahrs = MadgwickAhrs::new(0.05, true);
        let (accel, mag) = body_readings(
            50f64.to_radians(),
            20f64.to_radians(),
            -10f64.to_radians(),
            20.0,
            40.0,
        );
        let attitude = ahrs.estimate(&still(accel, mag), 0.01);
        assert!((attitude.yaw.to_degrees() - 50.0).abs() < 1e-6);
        assert!((attitude.pitch.to_degrees() - 20.0).abs() < 1e-6);
        assert!((attitude.roll.to_degrees() + 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_converges_to_identity_when_level() {
        let mut ahrs = MadgwickAhrs::new(0.05, true);
        ahrs.set_quaternion(UnitQuaternion::from_euler_angles(
            10f64.to_radians(),
            -8f64.to_radians(),
            15f64.to_radians(),
        ));
        let (accel, mag) = body_readings(0.0, 0.0, 0.0, 20.0, 40.0);
        let sample = still(accel, mag);

        // 20 s at 100 Hz
        for _ in 0..2000 {
            ahrs.estimate(&sample, 0.01);
        }
        let error = angle_to_identity(&ahrs.quaternion());
        assert!(error < 0.5, "still {error}° from identity");
    }

    #[test]
    fn test_stationary_holds_tilt() {
        let mut ahrs = MadgwickAhrs::new(0.05, false);
        let (accel, mag) = body_readings(0.0, 30f64.to_radians(), 0.0, 20.0, 40.0);
        let sample = still(accel, mag);
        let mut attitude = ahrs.estimate(&sample, 0.01);
        for _ in 0..500 {
            attitude = ahrs.estimate(&sample, 0.01);
        }
        assert!((attitude.pitch.to_degrees() - 30.0).abs() < 0.5);
        assert!(attitude.roll.to_degrees().abs() < 0.5);
    }

    #[test]
    fn test_gyro_yaw_direction() {
        // Clockwise turn seen from above: negative rate about up
        let mut ahrs = MadgwickAhrs::new(0.05, false);
        let accel = Vector3::new(0.0, 0.0, 9.81);
        ahrs.estimate(&still(accel, Vector3::zeros()), 0.01);

        let turning = BodySample {
            accel,
            gyro: Vector3::new(0.0, 0.0, -0.5),
            mag: Vector3::zeros(),
        };
        let mut attitude = Attitude::default();
        for _ in 0..100 {
            attitude = ahrs.estimate(&turning, 0.01);
        }
        // 0.5 rad/s for 1 s
        assert!((attitude.yaw - 0.5).abs() < 0.02, "yaw {}", attitude.yaw);
    }

    #[test]
    fn test_zero_accel_integrates_gyro_only() {
        let mut ahrs = MadgwickAhrs::new(0.05, false);
        ahrs.set_quaternion(UnitQuaternion::identity());
        let sample = BodySample {
            accel: Vector3::zeros(),
            gyro: Vector3::zeros(),
            mag: Vector3::zeros(),
        };
        ahrs.estimate(&sample, 0.01);
        assert!(angle_to_identity(&ahrs.quaternion()) < 1e-12);
    }
}
