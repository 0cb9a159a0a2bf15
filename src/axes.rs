//! Mounting-agnostic body axes
//!
//! The IMU can be glued into the glasses frame in any of the 24 right-angle
//! orientations. Instead of enumerating them, the wearer names which sensor
//! axis points forward and which points up; everything downstream works in
//! the resulting forward/right/up basis.
//!
//! # Example
//! ```
//! use nalgebra::Vector3;
//! use headtrack_fusion::AxisMap;
//!
//! let map = AxisMap::from_names("-x", "y").unwrap();
//!
//! // right = forward × up
//! assert_eq!(map.right, Vector3::new(0.0, 0.0, -1.0));
//!
//! // Gravity along +y reads entirely as "up"
//! let body = map.map(&Vector3::new(0.0, 9.81, 0.0));
//! assert_eq!(body, Vector3::new(0.0, 0.0, 9.81));
//! ```

use core::fmt;
use core::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use nalgebra::{Matrix3, Vector3};
use tracing::info;

use crate::error::{Error, Result};
use crate::transport::{SensorTransport, collect};

/// Cross-product norm below which forward and up count as parallel
const PARALLEL_EPSILON: f64 = 0.1;

/// Sensor axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    X,
    Y,
    Z,
}

impl Component {
    /// Next axis in the x → y → z → x cycle.
    pub fn next(self) -> Self {
        match self {
            Component::X => Component::Y,
            Component::Y => Component::Z,
            Component::Z => Component::X,
        }
    }

    fn index(self) -> usize {
        match self {
            Component::X => 0,
            Component::Y => 1,
            Component::Z => 2,
        }
    }
}

/// A signed sensor axis such as `-x` or `z`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisDirection {
    pub component: Component,
    pub negative: bool,
}

impl AxisDirection {
    pub const fn new(component: Component, negative: bool) -> Self {
        Self {
            component,
            negative,
        }
    }

    /// Unit vector along this axis in sensor coordinates.
    pub fn vector(&self) -> Vector3<f64> {
        let mut v = Vector3::zeros();
        v[self.component.index()] = if self.negative { -1.0 } else { 1.0 };
        v
    }
}

impl FromStr for AxisDirection {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_lowercase();
        let (negative, axis) = match normalized.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, normalized.as_str()),
        };
        let component = match axis {
            "x" => Component::X,
            "y" => Component::Y,
            "z" => Component::Z,
            _ => return Err(Error::InvalidAxis(name.to_string())),
        };
        Ok(Self::new(component, negative))
    }
}

impl fmt::Display for AxisDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let axis = match self.component {
            Component::X => "x",
            Component::Y => "y",
            Component::Z => "z",
        };
        if self.negative {
            write!(f, "-{axis}")
        } else {
            f.write_str(axis)
        }
    }
}

/// Parse an axis name (`x`, `-y`, ...) into its unit vector.
pub fn parse_axis(name: &str) -> Result<Vector3<f64>> {
    Ok(name.parse::<AxisDirection>()?.vector())
}

/// Orthonormal forward/up/right basis expressed in sensor coordinates
///
/// Invariant: the three vectors are mutually orthogonal unit vectors and
/// `right = forward × up`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisMap {
    pub forward: Vector3<f64>,
    pub up: Vector3<f64>,
    pub right: Vector3<f64>,
    forward_axis: AxisDirection,
    up_axis: AxisDirection,
}

impl AxisMap {
    /// Build the basis from two signed axes.
    pub fn new(forward_axis: AxisDirection, up_axis: AxisDirection) -> Result<Self> {
        let forward = forward_axis.vector();
        let up = up_axis.vector();
        let right = forward.cross(&up);

        if right.norm() < PARALLEL_EPSILON {
            return Err(Error::DegenerateAxes {
                forward: forward_axis.to_string(),
                up: up_axis.to_string(),
            });
        }

        Ok(Self {
            forward,
            up,
            right,
            forward_axis,
            up_axis,
        })
    }

    /// Build the basis from axis names, e.g. `("-x", "y")`.
    pub fn from_names(forward_name: &str, up_name: &str) -> Result<Self> {
        Self::new(forward_name.parse()?, up_name.parse()?)
    }

    pub fn forward_axis(&self) -> AxisDirection {
        self.forward_axis
    }

    pub fn up_axis(&self) -> AxisDirection {
        self.up_axis
    }

    /// Project a sensor-frame vector onto (forward, right, up).
    #[inline]
    pub fn map(&self, sensor: &Vector3<f64>) -> Vector3<f64> {
        Vector3::new(
            sensor.dot(&self.forward),
            sensor.dot(&self.right),
            sensor.dot(&self.up),
        )
    }

    /// Whether (forward, right, up) forms a right-handed frame.
    ///
    /// Because `right = forward × up`, this is false for every valid map;
    /// the method exists so integrating code does not have to assume it.
    pub fn is_right_handed(&self) -> bool {
        Matrix3::from_rows(&[
            self.forward.transpose(),
            self.right.transpose(),
            self.up.transpose(),
        ])
        .determinant()
            > 0.0
    }
}

/// Shorthand for [`AxisMap::from_names`].
pub fn build_map(forward_name: &str, up_name: &str) -> Result<AxisMap> {
    AxisMap::from_names(forward_name, up_name)
}

/// Pick the up axis from accelerometer samples taken while stationary.
///
/// The axis with the largest mean magnitude wins; a positive mean means the
/// positive axis points up (the accelerometer reads +g against gravity).
pub fn auto_detect_up(gravity_samples: &[Vector3<f64>]) -> Result<AxisDirection> {
    if gravity_samples.is_empty() {
        return Err(Error::NoSamples);
    }

    let sum: Vector3<f64> = gravity_samples.iter().sum();
    let mean = sum / gravity_samples.len() as f64;

    let component = [Component::X, Component::Y, Component::Z]
        .into_iter()
        .fold(Component::X, |best, candidate| {
            if mean[candidate.index()].abs() > mean[best.index()].abs() {
                candidate
            } else {
                best
            }
        });

    Ok(AxisDirection::new(component, mean[component.index()] <= 0.0))
}

/// Keep forward orthogonal to a newly detected up axis.
///
/// When both name the same sensor axis, forward moves to the next axis in
/// the x → y → z → x cycle (unsigned); otherwise it is returned unchanged.
pub fn reconcile_forward(forward: AxisDirection, up: AxisDirection) -> AxisDirection {
    if forward.component == up.component {
        AxisDirection::new(up.component.next(), false)
    } else {
        forward
    }
}

/// Sample the accelerometer while the wearer holds still and work out the
/// mounting: the up axis from gravity, forward reconciled against it.
pub fn detect_mounting<T: SensorTransport + ?Sized>(
    transport: &mut T,
    forward: AxisDirection,
    count: usize,
    period: Duration,
    cancel: &AtomicBool,
) -> Result<(AxisDirection, AxisDirection)> {
    info!(samples = count, "Detecting up axis, keep the sensor still");
    let gravity = collect(count, period, cancel, |_| transport.read_accel())?;
    let up = auto_detect_up(&gravity)?;
    let forward_detected = reconcile_forward(forward, up);
    info!(forward = %forward_detected, up = %up, "Detected mounting");
    Ok((forward_detected, up))
}
