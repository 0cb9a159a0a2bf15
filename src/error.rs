//! Error types for the head-tracking estimator

use std::fmt;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Physical sensor a transport read was aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    Accelerometer,
    Gyroscope,
    Magnetometer,
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensor::Accelerometer => "accelerometer",
            Sensor::Gyroscope => "gyroscope",
            Sensor::Magnetometer => "magnetometer",
        };
        f.write_str(name)
    }
}

/// Estimator error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Axis name is not `x`, `y` or `z` with an optional leading `-`
    #[error("Invalid axis: {0:?}")]
    InvalidAxis(String),

    /// Forward and up axes do not span a plane
    #[error("Forward axis {forward} and up axis {up} are parallel")]
    DegenerateAxes {
        /// Configured forward axis
        forward: String,
        /// Configured up axis
        up: String,
    },

    /// Sensor transport failure
    #[error("Failed to read {sensor}: {reason}")]
    SensorRead {
        /// Sensor that failed
        sensor: Sensor,
        /// Transport-specific description
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Calibration record could not be encoded or decoded
    #[error("Calibration record error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Config encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    /// A blocking routine observed its cancellation flag
    #[error("Operation cancelled")]
    Cancelled,

    /// A statistical routine received no samples
    #[error("No samples collected")]
    NoSamples,
}

impl Error {
    /// Shorthand used by transport implementations.
    pub fn sensor_read(sensor: Sensor, reason: impl Into<String>) -> Self {
        Error::SensorRead {
            sensor,
            reason: reason.into(),
        }
    }
}
