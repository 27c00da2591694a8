//! Loopback transport for running the bridge without hardware.
//!
//! Commands are latched into a [`SimulatedPlant`]; a producer thread steps
//! the plant every [`PUBLISH_PERIOD`], like a motor controller publishing
//! on its own clock:
//!
//! - position joints report their last commanded raw position
//! - quadrature joints integrate their last commanded velocity into count
//!   deltas over the time since the previous step
//!
//! Fractional counts are carried between steps so slow commands still move.

use crate::calibration::to_joint_space;
use crate::sensor_cache::{SensorInputs, lock_slot};
use crate::transport_registry::TransportContext;
use exca_common::hal::config::CalibrationEntry;
use exca_common::hal::transport::{HalError, Transport};
use exca_common::hal::types::RawCommand;
use exca_common::joint::{DriveMode, Joint, JointMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Registry name of the loopback transport.
pub const TRANSPORT_NAME: &str = "simulation";

/// Interval between simulated sensor publications.
pub const PUBLISH_PERIOD: Duration = Duration::from_millis(10);

/// Factory function to create a simulation transport instance.
pub fn create_transport(context: &TransportContext) -> Box<dyn Transport> {
    Box::new(SimulationTransport::new(context))
}

/// Fake joints that follow their last command exactly.
#[derive(Debug)]
pub struct SimulatedPlant {
    inputs: SensorInputs,
    drive: JointMap<DriveMode>,
    quadrature: JointMap<bool>,
    calibration: JointMap<CalibrationEntry>,
    commanded: JointMap<Option<f64>>,
    residual_counts: JointMap<f64>,
    last_step: Option<Instant>,
}

impl SimulatedPlant {
    /// Create a plant publishing into the bridge's inputs.
    pub fn new(context: &TransportContext) -> Self {
        let joints = &context.joints;
        Self {
            inputs: context.inputs.clone(),
            drive: JointMap::from_fn(|j| joints[j].drive),
            quadrature: JointMap::from_fn(|j| joints[j].quadrature),
            calibration: JointMap::from_fn(|j| joints[j].calibration()),
            commanded: JointMap::splat(None),
            residual_counts: JointMap::splat(0.0),
            last_step: None,
        }
    }

    /// Latch a raw command.
    pub fn command(&mut self, command: RawCommand) {
        self.commanded[command.joint] = Some(command.value);
    }

    /// Publish one round of samples as if measured at `now`.
    ///
    /// Joints that were never commanded stay silent.
    pub fn step(&mut self, now: Instant) {
        let elapsed = self
            .last_step
            .map_or(0.0, |prev| now.saturating_duration_since(prev).as_secs_f64());
        self.last_step = Some(now);

        for joint in Joint::ALL {
            let Some(raw) = self.commanded[joint] else {
                continue;
            };
            match self.drive[joint] {
                DriveMode::Position => self.inputs.on_position(joint, raw, now),
                DriveMode::Velocity if self.quadrature[joint] => {
                    let velocity = to_joint_space(&self.calibration[joint], raw);
                    let units_per_count = self.inputs.velocity().units_per_count(joint);

                    let counts = velocity * elapsed / units_per_count + self.residual_counts[joint];
                    let whole = counts.round();
                    self.residual_counts[joint] = counts - whole;
                    self.inputs.on_count_delta(joint, whole as i64, now);
                }
                DriveMode::Velocity => {}
            }
        }
    }
}

/// Loopback transport implementing the `Transport` trait.
pub struct SimulationTransport {
    plant: Arc<Mutex<SimulatedPlant>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    sent: u64,
}

impl SimulationTransport {
    /// Create the transport and start its publisher thread.
    ///
    /// If the thread cannot be spawned the plant is stepped on every send
    /// instead.
    pub fn new(context: &TransportContext) -> Self {
        let plant = Arc::new(Mutex::new(SimulatedPlant::new(context)));
        let running = Arc::new(AtomicBool::new(true));

        let worker = {
            let plant = Arc::clone(&plant);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("exca-sim".to_string())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        std::thread::sleep(PUBLISH_PERIOD);
                        lock_slot(&plant).step(Instant::now());
                    }
                })
        };
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Simulation publisher thread unavailable ({}), stepping on send", e);
                None
            }
        };

        info!(
            "Simulation transport publishing every {}ms",
            PUBLISH_PERIOD.as_millis()
        );
        Self {
            plant,
            running,
            worker,
            sent: 0,
        }
    }

    /// Number of commands accepted so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Simulation publisher thread panicked");
            }
        }
    }
}

impl Transport for SimulationTransport {
    fn name(&self) -> &'static str {
        TRANSPORT_NAME
    }

    fn send(&mut self, command: RawCommand) -> Result<(), HalError> {
        let mut plant = lock_slot(&self.plant);
        plant.command(command);
        if self.worker.is_none() {
            plant.step(Instant::now());
        }
        self.sent += 1;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        self.stop();
        info!("Simulation transport stopped after {} commands", self.sent);
        Ok(())
    }
}

impl Drop for SimulationTransport {
    fn drop(&mut self) {
        if self.worker.is_some() {
            debug!("Simulation transport dropped without shutdown");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor_cache::SensorCache;
    use crate::velocity::VelocityEstimator;
    use exca_common::hal::config::BridgeConfig;
    use std::f64::consts::TAU;

    fn context(start: Instant) -> TransportContext {
        let joints = BridgeConfig::default().joint_table().unwrap();
        TransportContext {
            inputs: SensorInputs::new(
                Arc::new(SensorCache::new()),
                Arc::new(VelocityEstimator::new(12800.0, &joints, start)),
            ),
            joints,
        }
    }

    #[test]
    fn test_position_command_is_reported_back() {
        let t0 = Instant::now();
        let ctx = context(t0);
        let mut plant = SimulatedPlant::new(&ctx);
        plant.command(RawCommand::new(Joint::Bin, 23552.0));
        plant.step(t0);

        let sample = ctx.inputs.cache().snapshot(Joint::Bin);
        assert_eq!(sample.position_raw, 23552.0);
        assert_eq!(sample.position_time, Some(t0));
    }

    #[test]
    fn test_uncommanded_joints_stay_silent() {
        let t0 = Instant::now();
        let ctx = context(t0);
        let mut plant = SimulatedPlant::new(&ctx);
        plant.step(t0);
        plant.step(t0 + PUBLISH_PERIOD);
        for joint in Joint::ALL {
            assert!(ctx.inputs.cache().snapshot(joint).last_update_time().is_none());
        }
        assert!(ctx.inputs.velocity().odometry(Joint::LeftTread).is_none());
    }

    #[test]
    fn test_velocity_command_integrates_counts() {
        let t0 = Instant::now();
        let ctx = context(t0);
        let mut plant = SimulatedPlant::new(&ctx);
        // 1000 raw ↔ 2π rad/s on the default tread calibration.
        plant.command(RawCommand::new(Joint::LeftTread, 1000.0));
        plant.step(t0);
        let t1 = t0 + Duration::from_secs(1);
        plant.step(t1);

        let acc = ctx.inputs.velocity().accumulator(Joint::LeftTread);
        assert_eq!(acc.accumulated_delta_count, 12800);
        let v = ctx.inputs.velocity().drain(Joint::LeftTread, t1);
        assert!((v - TAU).abs() < 1e-6);
    }

    #[test]
    fn test_fractional_counts_carry_over() {
        let t0 = Instant::now();
        let ctx = context(t0);
        let mut plant = SimulatedPlant::new(&ctx);
        // 0.1 raw → 0.0002π rad/s → 0.128 counts per 100 ms step.
        plant.command(RawCommand::new(Joint::RightTread, 0.1));
        for i in 0..=100 {
            plant.step(t0 + Duration::from_millis(100 * i));
        }
        let total = ctx.inputs.velocity().accumulator(Joint::RightTread).total_count;
        assert!((total - 13).abs() <= 1, "total={total}");
    }

    #[test]
    fn test_transport_publishes_in_background() {
        let ctx = context(Instant::now());
        let mut transport = SimulationTransport::new(&ctx);
        assert_eq!(transport.name(), TRANSPORT_NAME);

        transport.send(RawCommand::new(Joint::Scoop, 2.0)).unwrap();
        std::thread::sleep(PUBLISH_PERIOD * 5);
        assert_eq!(ctx.inputs.cache().snapshot(Joint::Scoop).position_raw, 2.0);

        transport.shutdown().unwrap();
        assert_eq!(transport.sent(), 1);
    }
}
