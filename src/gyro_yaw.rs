//! Gravity tilt with gyro-integrated yaw
//!
//! Roll and pitch come from the accelerometer as in the compass. Yaw is
//! integrated from the Euler yaw rate implied by the body rates at the
//! current tilt, and when the magnetometer is enabled each tick nudges it a
//! fixed fraction of the way toward the tilt-compensated heading.

use crate::compass::{tilt_compensated_heading, tilt_from_gravity};
use crate::estimator::{Attitude, BodySample, EstimationStrategy};
use crate::math::{clamp_magnitude_min, wrap_radians};

/// Smallest |cos(pitch)| divided by near ±90° pitch
const MIN_COS_PITCH: f64 = 0.001;

#[derive(Debug, Clone)]
pub struct YawRateIntegrator {
    use_magnetometer: bool,
    mag_weight: f64,
    /// Radians, clockwise positive
    yaw: f64,
    started: bool,
}

impl YawRateIntegrator {
    pub fn new(use_magnetometer: bool, mag_weight: f64) -> Self {
        Self {
            use_magnetometer,
            mag_weight,
            yaw: 0.0,
            started: false,
        }
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }
}

impl EstimationStrategy for YawRateIntegrator {
    fn estimate(&mut self, body: &BodySample, dt: f64) -> Attitude {
        let (roll, pitch) = tilt_from_gravity(&body.accel);
        let heading = self
            .use_magnetometer
            .then(|| tilt_compensated_heading(&body.mag, roll, pitch));

        if !self.started {
            // Start on the magnetic heading rather than blending up from 0
            self.yaw = heading.unwrap_or(0.0);
            self.started = true;
        } else {
            let (sin_r, cos_r) = roll.sin_cos();
            let cos_p = clamp_magnitude_min(pitch.cos(), MIN_COS_PITCH);
            let yaw_rate = (body.gyro.y * sin_r + body.gyro.z * cos_r) / cos_p;
            self.yaw -= yaw_rate * dt;

            if let Some(heading) = heading {
                self.yaw += self.mag_weight * wrap_radians(heading - self.yaw);
            }
            self.yaw = wrap_radians(self.yaw);
        }

        Attitude {
            roll,
            pitch,
            yaw: self.yaw,
        }
    }

    fn name(&self) -> &'static str {
        "yaw-rate"
    }
}
