//! Sensor transport capability
//!
//! The estimator never opens a bus. Whatever owns the I²C/SPI/USB link
//! implements [`SensorTransport`] and hands it to the service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use nalgebra::Vector3;

use crate::error::{Error, Result};
use crate::types::RawSample;

/// Blocking access to an accelerometer/gyroscope/magnetometer triple
pub trait SensorTransport {
    /// Specific force in m/s².
    fn read_accel(&mut self) -> Result<Vector3<f64>>;

    /// Angular rate in rad/s.
    fn read_gyro(&mut self) -> Result<Vector3<f64>>;

    /// Magnetic field in µT.
    fn read_mag(&mut self) -> Result<Vector3<f64>>;

    /// Bus address of the magnetometer, used to key its calibration file.
    fn bus_address(&self) -> u8;

    /// Read all three sensors, gyroscope first.
    fn read_sample(&mut self) -> Result<RawSample> {
        let gyro = self.read_gyro()?;
        let accel = self.read_accel()?;
        let mag = self.read_mag()?;
        Ok(RawSample { accel, gyro, mag })
    }
}

impl<T: SensorTransport + ?Sized> SensorTransport for &mut T {
    fn read_accel(&mut self) -> Result<Vector3<f64>> {
        (**self).read_accel()
    }

    fn read_gyro(&mut self) -> Result<Vector3<f64>> {
        (**self).read_gyro()
    }

    fn read_mag(&mut self) -> Result<Vector3<f64>> {
        (**self).read_mag()
    }

    fn bus_address(&self) -> u8 {
        (**self).bus_address()
    }

    fn read_sample(&mut self) -> Result<RawSample> {
        (**self).read_sample()
    }
}

impl<T: SensorTransport + ?Sized> SensorTransport for Box<T> {
    fn read_accel(&mut self) -> Result<Vector3<f64>> {
        (**self).read_accel()
    }

    fn read_gyro(&mut self) -> Result<Vector3<f64>> {
        (**self).read_gyro()
    }

    fn read_mag(&mut self) -> Result<Vector3<f64>> {
        (**self).read_mag()
    }

    fn bus_address(&self) -> u8 {
        (**self).bus_address()
    }

    fn read_sample(&mut self) -> Result<RawSample> {
        (**self).read_sample()
    }
}

/// Take `count` readings `period` apart, stopping early if `cancel` is raised.
pub(crate) fn collect<F>(
    count: usize,
    period: Duration,
    cancel: &AtomicBool,
    mut read: F,
) -> Result<Vec<Vector3<f64>>>
where
    F: FnMut(usize) -> Result<Vector3<f64>>,
{
    let mut samples = Vec::with_capacity(count);
    for i in 0..count {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        samples.push(read(i)?);
        if !period.is_zero() {
            thread::sleep(period);
        }
    }
    Ok(samples)
}
