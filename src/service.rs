//! Fixed-cadence orientation service
//!
//! Owns the sensor transport and the estimator. Startup resolves mounting
//! and calibration; after that every tick reads one sample, refreshes the
//! online magnetometer calibration and emits an [`Orientation`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use nalgebra::Vector3;
use tracing::{debug, info, trace, warn};

use crate::axes::{AxisDirection, detect_mounting};
use crate::calibration::{CalibrationProfile, MagCalibration, OnlineMagCalibration};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::estimator::OrientationEstimator;
use crate::store::CalibrationStore;
use crate::transport::SensorTransport;
use crate::types::Orientation;

/// What [`OrientationService::run`] does when a sensor read fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadErrorPolicy {
    /// Log, count and carry on with the next tick
    #[default]
    Skip,
    /// Stop the loop and return the error
    Abort,
}

/// Sensor loop state
pub struct OrientationService<T: SensorTransport> {
    transport: T,
    estimator: OrientationEstimator,
    online_mag: Option<OnlineMagCalibration>,
    period: Duration,
    last_tick: Option<Instant>,
    read_errors: u64,
}

impl<T: SensorTransport> OrientationService<T> {
    /// Wire an already-built estimator to a transport. No sensor I/O.
    pub fn new(transport: T, estimator: OrientationEstimator, config: &ServiceConfig) -> Self {
        let online_mag = config
            .online_mag_calibration
            .then(|| OnlineMagCalibration::new(estimator.calibration().mag()));
        Self {
            transport,
            estimator,
            online_mag,
            period: config.sample_period(),
            last_tick: None,
            read_errors: 0,
        }
    }

    /// Startup phase: resolve the mounting, load (or take) calibration from
    /// `config.calibration_dir` and build the estimator.
    ///
    /// Blocks while detecting the up axis or calibrating the gyroscope;
    /// raising `cancel` aborts either with [`Error::Cancelled`](crate::Error::Cancelled).
    pub fn start(mut transport: T, config: &ServiceConfig, cancel: &AtomicBool) -> Result<Self> {
        let store = CalibrationStore::new(&config.calibration_dir);
        let mut settings = config.estimator.clone();

        if config.auto_detect_up {
            let forward: AxisDirection = settings.forward_axis.parse()?;
            let (forward, up) = detect_mounting(
                &mut transport,
                forward,
                config.detect_samples,
                config.calibration_sample_period(),
                cancel,
            )?;
            settings.forward_axis = forward.to_string();
            settings.up_axis = up.to_string();
        }

        let address = transport.bus_address();
        let mag = match store.load_mag_profile(address) {
            Ok(mag) => mag,
            Err(err) => {
                warn!(%err, address = %format!("0x{address:x}"), "Unreadable magnetometer calibration, using defaults");
                MagCalibration::default()
            }
        };

        let gyro_bias = if settings.use_gyro {
            let bias = match store.load_gyro_bias() {
                Ok(bias) => bias,
                Err(err) => {
                    warn!(%err, "Unreadable gyroscope calibration, recalibrating");
                    None
                }
            };
            match bias {
                Some(bias) => bias,
                None => store.calibrate_gyro_static(
                    &mut transport,
                    config.gyro_calibration_samples,
                    config.calibration_sample_period(),
                    cancel,
                )?,
            }
        } else {
            Vector3::zeros()
        };

        let estimator = OrientationEstimator::new(settings, CalibrationProfile::new(gyro_bias, mag))?;
        info!(
            strategy = estimator.strategy_name(),
            forward = %estimator.axes().forward_axis(),
            up = %estimator.axes().up_axis(),
            use_magnetometer = estimator.settings().use_magnetometer,
            "Orientation service started"
        );
        Ok(Self::new(transport, estimator, config))
    }

    /// Read and process one sample now.
    pub fn tick(&mut self) -> Result<Orientation> {
        self.tick_at(Instant::now())
    }

    /// Read and process one sample stamped `now`.
    ///
    /// Δt is measured from the previous successful tick; the first tick uses
    /// the configured period. A failed read leaves all state untouched, and
    /// so does a sample with NaN or infinite readings.
    pub fn tick_at(&mut self, now: Instant) -> Result<Orientation> {
        let raw = match self.transport.read_sample() {
            Ok(raw) => raw,
            Err(err) => {
                self.read_errors += 1;
                return Err(err);
            }
        };

        if !raw.is_finite() {
            // Counted and logged by the estimator, which hands back the last orientation
            return Ok(self.estimator.update(&raw, self.period.as_secs_f64()));
        }

        let dt = match self.last_tick {
            Some(previous) => now.saturating_duration_since(previous).as_secs_f64(),
            None => self.period.as_secs_f64(),
        };
        self.last_tick = Some(now);

        if let Some(online) = &mut self.online_mag {
            if online.update(&raw.mag) {
                self.estimator.set_mag_calibration(online.calibration());
            }
        }

        let orientation = self.estimator.update(&raw, dt);
        trace!(
            roll = orientation.roll,
            pitch = orientation.pitch,
            yaw = orientation.yaw,
            dt,
            "Tick"
        );

        let ticks = self.estimator.ticks();
        if ticks > 0 && ticks % 1000 == 0 {
            debug!(ticks, "Orientation samples processed");
        }
        Ok(orientation)
    }

    /// Tick every configured period until `stop` is raised, handing each
    /// orientation to `consumer`.
    pub fn run<F>(&mut self, stop: &AtomicBool, policy: ReadErrorPolicy, mut consumer: F) -> Result<()>
    where
        F: FnMut(&Orientation),
    {
        let mut deadline = Instant::now();
        while !stop.load(Ordering::Relaxed) {
            match self.tick() {
                Ok(orientation) => consumer(&orientation),
                Err(err) => match policy {
                    ReadErrorPolicy::Skip => {
                        warn!(%err, read_errors = self.read_errors, "Sensor read failed, skipping tick");
                    }
                    ReadErrorPolicy::Abort => return Err(err),
                },
            }

            deadline += self.period;
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            } else {
                // Fell behind; don't try to catch up with a burst
                deadline = now;
            }
        }

        info!(
            ticks = self.estimator.ticks(),
            skipped = self.estimator.skipped_ticks(),
            read_errors = self.read_errors,
            "Orientation service stopped"
        );
        Ok(())
    }

    /// Clear the relative-yaw reference; see [`OrientationEstimator::rezero_yaw`].
    pub fn rezero_yaw(&mut self) {
        self.estimator.rezero_yaw();
    }

    pub fn estimator(&self) -> &OrientationEstimator {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut OrientationEstimator {
        &mut self.estimator
    }

    pub fn online_mag(&self) -> Option<&OnlineMagCalibration> {
        self.online_mag.as_ref()
    }

    /// Failed sensor reads since construction.
    pub fn read_errors(&self) -> u64 {
        self.read_errors
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}
