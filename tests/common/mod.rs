#![allow(dead_code)]

use std::collections::VecDeque;

use headtrack_fusion::{AxisMap, Error, RawSample, Result, Sensor, SensorTransport};
use nalgebra::Vector3;

pub const GRAVITY: f64 = 9.81;
/// Horizontal and downward field components (µT), roughly mid-latitude
pub const FIELD_NORTH: f64 = 20.0;
pub const FIELD_DOWN: f64 = 40.0;

/// Gravity and magnetic field in the (forward, right, up) basis for a head
/// at `heading` (clockwise from north), `pitch` (nose up) and `roll` (right
/// side up), all in degrees.
pub fn body_readings(heading: f64, pitch: f64, roll: f64) -> (Vector3<f64>, Vector3<f64>) {
    let (heading, pitch, roll) = (heading.to_radians(), pitch.to_radians(), roll.to_radians());

    // World: north, west, up
    let north = Vector3::x();
    let east = -Vector3::y();
    let up = Vector3::z();

    let forward = north * heading.cos() + east * heading.sin();
    let right = -north * heading.sin() + east * heading.cos();

    let up_pitched = -forward * pitch.sin() + up * pitch.cos();
    let forward = forward * pitch.cos() + up * pitch.sin();

    let right_rolled = right * roll.cos() + up_pitched * roll.sin();
    let up_rolled = -right * roll.sin() + up_pitched * roll.cos();

    let gravity = up * GRAVITY;
    let field = north * FIELD_NORTH - up * FIELD_DOWN;
    let project = |v: Vector3<f64>| Vector3::new(v.dot(&forward), v.dot(&right_rolled), v.dot(&up_rolled));
    (project(gravity), project(field))
}

/// Express a body-frame vector in sensor axes for the given mounting.
pub fn to_sensor(map: &AxisMap, body: &Vector3<f64>) -> Vector3<f64> {
    map.forward * body.x + map.right * body.y + map.up * body.z
}

/// Raw sample a still head at the given pose produces under `map`.
pub fn still_sample(map: &AxisMap, heading: f64, pitch: f64, roll: f64) -> RawSample {
    let (accel, mag) = body_readings(heading, pitch, roll);
    RawSample::new(to_sensor(map, &accel), Vector3::zeros(), to_sensor(map, &mag))
}

/// Transport replaying a script of samples, then repeating a fixed one
///
/// Each `read_gyro` advances the script, matching the gyroscope-first
/// order of `read_sample`.
pub struct ScriptedTransport {
    pub script: VecDeque<Option<RawSample>>,
    pub steady: RawSample,
    pub current: RawSample,
    pub address: u8,
    pub reads: usize,
}

impl ScriptedTransport {
    pub fn steady(sample: RawSample) -> Self {
        Self {
            script: VecDeque::new(),
            steady: sample,
            current: sample,
            address: 0x1c,
            reads: 0,
        }
    }

    /// Queue samples ahead of the steady one; `None` entries fail the read.
    pub fn with_script(mut self, script: impl IntoIterator<Item = Option<RawSample>>) -> Self {
        self.script = script.into_iter().collect();
        self
    }
}

impl SensorTransport for ScriptedTransport {
    fn read_accel(&mut self) -> Result<Vector3<f64>> {
        Ok(self.current.accel)
    }

    fn read_gyro(&mut self) -> Result<Vector3<f64>> {
        self.reads += 1;
        match self.script.pop_front() {
            Some(Some(sample)) => self.current = sample,
            Some(None) => return Err(Error::sensor_read(Sensor::Gyroscope, "scripted failure")),
            None => self.current = self.steady,
        }
        Ok(self.current.gyro)
    }

    fn read_mag(&mut self) -> Result<Vector3<f64>> {
        Ok(self.current.mag)
    }

    fn bus_address(&self) -> u8 {
        self.address
    }
}
