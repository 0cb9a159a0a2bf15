//! Exponential smoothing of angles across the ±180° seam

use crate::math::wrap_degrees;

/// Move `previous` toward `new` by `alpha` of the shortest angular distance.
///
/// Both angles are in degrees; the result is normalized into [-180, 180].
/// `alpha = 1` returns `new`, `alpha = 0` returns `previous`.
///
/// # Example
/// ```
/// use headtrack_fusion::smooth;
///
/// // 179° → -179° is a 2° step through the seam, not 358° back through 0°
/// let halfway = smooth(179.0, -179.0, 0.5);
/// assert!((halfway.abs() - 180.0).abs() < 1e-9);
/// ```
#[inline]
pub fn smooth(previous: f64, new: f64, alpha: f64) -> f64 {
    let diff = wrap_degrees(new - previous);
    wrap_degrees(previous + alpha * diff)
}

/// Per-axis smoothing factors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleSmoother {
    pub roll_pitch_alpha: f64,
    pub yaw_alpha: f64,
}

/// Smoothed roll/pitch/yaw accumulators in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SmoothedAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl AngleSmoother {
    pub fn new(roll_pitch_alpha: f64, yaw_alpha: f64) -> Self {
        Self {
            roll_pitch_alpha,
            yaw_alpha,
        }
    }

    /// Fold one raw estimate into the accumulators.
    pub fn apply(&self, state: &mut SmoothedAngles, roll: f64, pitch: f64, yaw: f64) {
        state.roll = smooth(state.roll, roll, self.roll_pitch_alpha);
        state.pitch = smooth(state.pitch, pitch, self.roll_pitch_alpha);
        state.yaw = smooth(state.yaw, yaw, self.yaw_alpha);
    }
}
