//! Orientation service over a simulated IMU
//!
//! A synthetic head holds still for a second (long enough for the startup
//! gyroscope calibration), then slowly turns right and nods while the
//! service runs at 100 Hz. Calibration files go to a temporary directory.
//!
//! Run with: `RUST_LOG=debug cargo run --example simulate`

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use headtrack_fusion::{
    EstimatorSettings, OrientationService, ReadErrorPolicy, Result, SensorTransport, ServiceConfig, Strategy,
};
use nalgebra::Vector3;
use rand::prelude::*;
use rand_pcg::Pcg64;
use tracing_subscriber::EnvFilter;

const RUN_SECONDS: f64 = 5.0;
const TURN_RATE: f64 = 0.3; // rad/s, clockwise
const NOD_AMPLITUDE: f64 = 0.25; // rad
const NOD_FREQUENCY: f64 = 0.5; // Hz
const STILL_SECONDS: f64 = 1.0;

/// Glasses with the IMU mounted forward = -x, up = y
struct SimulatedImu {
    start: Instant,
    rng: Pcg64,
    gyro_bias: Vector3<f64>,
}

impl SimulatedImu {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            rng: Pcg64::seed_from_u64(1),
            gyro_bias: Vector3::new(0.003, -0.002, 0.001),
        }
    }

    /// Seconds since the head started moving
    fn motion_time(&self) -> f64 {
        (self.start.elapsed().as_secs_f64() - STILL_SECONDS).max(0.0)
    }

    fn pose(&self) -> (f64, f64) {
        let t = self.motion_time();
        let heading = TURN_RATE * t;
        let pitch = NOD_AMPLITUDE * (2.0 * std::f64::consts::PI * NOD_FREQUENCY * t).sin();
        (heading, pitch)
    }

    /// (forward, right, up) body vector → sensor axes for this mounting
    fn to_sensor(body: Vector3<f64>) -> Vector3<f64> {
        // forward = -x, up = y, right = forward × up = -z
        Vector3::new(-body.x, body.z, -body.y)
    }

    fn noise(&mut self, scale: f64) -> Vector3<f64> {
        Vector3::new(
            self.rng.random_range(-scale..scale),
            self.rng.random_range(-scale..scale),
            self.rng.random_range(-scale..scale),
        )
    }
}

impl SensorTransport for SimulatedImu {
    fn read_accel(&mut self) -> Result<Vector3<f64>> {
        let (_, pitch) = self.pose();
        let body = Vector3::new(pitch.sin(), 0.0, pitch.cos()) * 9.81;
        Ok(Self::to_sensor(body) + self.noise(0.05))
    }

    fn read_gyro(&mut self) -> Result<Vector3<f64>> {
        let t = self.motion_time();
        if t == 0.0 {
            return Ok(self.gyro_bias + self.noise(0.002));
        }
        let omega = 2.0 * std::f64::consts::PI * NOD_FREQUENCY;
        let pitch_rate = NOD_AMPLITUDE * omega * (omega * t).cos();
        // Nose up spins about +right (forward × up), a clockwise turn about -up
        let body = Vector3::new(0.0, pitch_rate, -TURN_RATE);
        Ok(Self::to_sensor(body) + self.gyro_bias + self.noise(0.002))
    }

    fn read_mag(&mut self) -> Result<Vector3<f64>> {
        let (heading, pitch) = self.pose();
        let (north, down) = (20.0, 40.0);
        // Field seen from a head turned clockwise by `heading`, then pitched
        let horizontal_fwd = north * heading.cos();
        let horizontal_right = -north * heading.sin();
        let body = Vector3::new(
            horizontal_fwd * pitch.cos() - down * pitch.sin(),
            horizontal_right,
            -horizontal_fwd * pitch.sin() - down * pitch.cos(),
        );
        Ok(Self::to_sensor(body) + self.noise(0.5))
    }

    fn bus_address(&self) -> u8 {
        0x1c
    }
}

fn main() -> std::result::Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Simulated head tracking - turning right at {TURN_RATE} rad/s while nodding");

    let calibration_dir = tempfile::tempdir()?;
    let config = ServiceConfig {
        estimator: EstimatorSettings {
            strategy: Strategy::Madgwick,
            use_magnetometer: true,
            ..Default::default()
        },
        calibration_dir: calibration_dir.path().to_path_buf(),
        gyro_calibration_samples: 200,
        calibration_sample_period_ms: 0,
        // The simulated field has no hard-iron offset to learn
        online_mag_calibration: false,
        ..Default::default()
    };

    let cancel = AtomicBool::new(false);
    let mut service = OrientationService::start(SimulatedImu::new(), &config, &cancel)?;

    let started = Instant::now();
    let stop = AtomicBool::new(false);
    let mut ticks = 0u64;
    service.run(&stop, ReadErrorPolicy::Skip, |orientation| {
        ticks += 1;
        if ticks % 25 == 0 {
            println!(
                "t={:5.2}s  roll {:7.2}°  pitch {:7.2}°  yaw {:7.2}°",
                started.elapsed().as_secs_f64(),
                orientation.roll,
                orientation.pitch,
                orientation.yaw
            );
        }
        if started.elapsed().as_secs_f64() >= STILL_SECONDS + RUN_SECONDS {
            stop.store(true, Ordering::Relaxed);
        }
    })?;

    let bias = service.estimator().calibration().gyro_bias;
    println!(
        "Estimated gyroscope bias: ({:.4}, {:.4}, {:.4}) rad/s",
        bias.x, bias.y, bias.z
    );
    Ok(())
}
