//! Bridge core: the hardware interface orchestrator.
//!
//! `BridgeCore` owns the calibration table, the command clamp, the outbound
//! transport and the tick-side view of the shared sensor cache and velocity
//! estimator. The control loop calls, once per tick and on one thread:
//!
//! ```text
//! read() ──► state() ──► controller ──► commands_mut() ──► write()
//! ```
//!
//! Producers never touch `BridgeCore`; they push samples through the
//! [`SensorInputs`] handle returned by [`BridgeCore::inputs`]. Neither `read()`
//! nor `write()` can fail: out-of-range data is clamped, non-finite commands
//! are replaced by the safe-state value and transport errors are counted.

use crate::calibration::CalibrationTable;
use crate::clamp::{CommandClamp, SlewLimiter};
use crate::sensor_cache::{SensorCache, SensorInputs};
use crate::transport_registry::{TransportContext, TransportRegistry};
use crate::velocity::VelocityEstimator;
use exca_common::consts::ARM_JOINT_COUNT;
use exca_common::hal::config::{BridgeConfig, CalibrationEntry, JointConfig};
use exca_common::hal::transport::{HalError, Transport};
use exca_common::hal::types::{JointState, RawCommand};
use exca_common::joint::{DriveMode, Joint, JointMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Hardware interface orchestrator.
pub struct BridgeCore {
    /// Per-joint configuration
    joints: JointMap<JointConfig>,
    /// Raw ↔ joint-space mapping (mutated only by `rezero`)
    calibration: CalibrationTable,
    /// Range clamp and safe-state values
    clamp: CommandClamp,
    /// Drivebase acceleration limit
    slew: SlewLimiter,
    /// Latest raw samples, shared with producers
    cache: Arc<SensorCache>,
    /// Quadrature accumulators, shared with producers
    velocity: Arc<VelocityEstimator>,
    /// Outbound command channel
    transport: Box<dyn Transport>,
    /// Feedback produced by the last `read()`
    state: JointState,
    /// Commands consumed by the next `write()`
    commands: JointMap<f64>,
    /// Raw values handed to the transport by the last dispatch
    dispatched: JointMap<f64>,
    /// Gate between real commands and safe-state
    enabled: bool,
    /// Time of the previous dispatch, for the slew limiter
    last_write: Option<Instant>,
    /// Transport sends that returned an error
    dispatch_failures: u64,
    /// Non-finite commands replaced by safe-state values
    coerced_commands: u64,
}

impl BridgeCore {
    /// Create a bridge whose velocity windows start now.
    ///
    /// `make_transport` receives the input handle and joint table so a
    /// transport can feed samples back into this bridge.
    ///
    /// # Errors
    /// Returns `HalError::ConfigError` if `config` fails validation.
    pub fn new<F>(config: &BridgeConfig, make_transport: F) -> Result<Self, HalError>
    where
        F: FnOnce(&TransportContext) -> Box<dyn Transport>,
    {
        Self::with_start_time(config, make_transport, Instant::now())
    }

    /// Create a bridge using the transport registered under `config.transport`.
    ///
    /// # Errors
    /// Returns `HalError::ConfigError` for an invalid configuration and
    /// `HalError::TransportNotFound` for an unknown transport name.
    pub fn from_registry(config: &BridgeConfig, registry: &TransportRegistry) -> Result<Self, HalError> {
        let factory = registry.resolve(&config.transport)?;
        Self::new(config, factory)
    }

    /// Create a bridge whose first velocity window starts at `start`.
    ///
    /// # Errors
    /// Returns `HalError::ConfigError` if `config` fails validation.
    pub fn with_start_time<F>(config: &BridgeConfig, make_transport: F, start: Instant) -> Result<Self, HalError>
    where
        F: FnOnce(&TransportContext) -> Box<dyn Transport>,
    {
        config.validate()?;
        let joints = config.joint_table()?;
        let calibration = CalibrationTable::from_config(&joints)?;

        let cache = Arc::new(SensorCache::new());
        let velocity = Arc::new(VelocityEstimator::new(config.counts_per_revolution, &joints, start));
        let context = TransportContext {
            inputs: SensorInputs::new(Arc::clone(&cache), Arc::clone(&velocity)),
            joints,
        };
        let transport = make_transport(&context);

        let idle = JointMap::from_fn(|j| joints[j].idle_value);
        let clamp = CommandClamp::new(&joints);
        let mut state = JointState::default();
        state.position = idle;
        let commands = clamp.safe_state(&idle);
        let mut slew = SlewLimiter::new(&joints);
        slew.reset(&commands);

        info!(
            "BridgeCore created: transport={}, cycle_time={}us, enabled={}",
            transport.name(),
            config.cycle_time_us,
            config.start_enabled
        );

        Ok(Self {
            joints,
            calibration,
            clamp,
            slew,
            cache,
            velocity,
            transport,
            state,
            commands,
            dispatched: JointMap::splat(0.0),
            enabled: config.start_enabled,
            last_write: None,
            dispatch_failures: 0,
            coerced_commands: 0,
        })
    }

    /// Cloneable handle for sample producers.
    pub fn inputs(&self) -> SensorInputs {
        SensorInputs::new(Arc::clone(&self.cache), Arc::clone(&self.velocity))
    }

    /// Refresh the joint state from the latest samples.
    pub fn read(&mut self) {
        self.read_at(Instant::now());
    }

    /// Refresh the joint state, closing velocity windows at `now`.
    ///
    /// Position comes from the calibrated raw reading, or `idle_value` if the
    /// joint has never reported (`state().reported` tells which); velocity-driven
    /// quadrature joints report odometry instead, taken in the same lock hold
    /// as the velocity window. Velocity is the window average from the estimator
    /// (0 for joints without a quadrature counter). Effort is the raw torque.
    pub fn read_at(&mut self, now: Instant) {
        for joint in Joint::ALL {
            let sample = self.cache.snapshot(joint);
            let config = &self.joints[joint];

            let (velocity, odometry) = self.velocity.drain_with_odometry(joint, now);
            let odometry = match config.drive {
                DriveMode::Velocity => odometry,
                DriveMode::Position => None,
            };
            let (position, reported) = match odometry {
                Some(distance) => (distance, true),
                None if sample.has_position() => (self.calibration.to_joint_space(joint, sample.position_raw), true),
                None => (config.idle_value, false),
            };
            self.state.position[joint] = position;
            self.state.reported[joint] = reported;
            self.state.velocity[joint] = velocity;
            self.state.effort[joint] = sample.torque_raw;
        }
    }

    /// Feedback from the last `read()`.
    #[inline]
    pub fn state(&self) -> &JointState {
        &self.state
    }

    /// Command array consumed by the next `write()`.
    #[inline]
    pub fn commands(&self) -> &JointMap<f64> {
        &self.commands
    }

    /// Mutable command array for the joint controller.
    #[inline]
    pub fn commands_mut(&mut self) -> &mut JointMap<f64> {
        &mut self.commands
    }

    /// Set one joint's command.
    #[inline]
    pub fn set_command(&mut self, joint: Joint, value: f64) {
        self.commands[joint] = value;
    }

    /// Dispatch the current commands.
    pub fn write(&mut self) {
        self.write_at(Instant::now());
    }

    /// Dispatch the current commands, timing the slew limiter against `now`.
    ///
    /// Disabled: every joint receives its safe-state value. Enabled: each
    /// command is coerced (non-finite → safe value), clamped to the joint
    /// range, slewed and converted to hardware units.
    pub fn write_at(&mut self, now: Instant) {
        let dt_s = self
            .last_write
            .map_or(0.0, |prev| now.saturating_duration_since(prev).as_secs_f64());
        self.last_write = Some(now);

        if !self.enabled {
            let safe = self.clamp.safe_state(&self.state.position);
            self.slew.reset(&safe);
            self.dispatch_all(&safe);
            return;
        }

        let mut targets = JointMap::splat(0.0);
        for joint in Joint::ALL {
            let requested = self.commands[joint];
            let value = if requested.is_finite() {
                requested
            } else {
                self.coerced_commands += 1;
                let safe = self.clamp.safe_value(joint, self.state.position[joint]);
                warn!("Non-finite command {} for {}, sending {}", requested, joint, safe);
                safe
            };
            let limited = self.clamp.limit(joint, value);
            targets[joint] = self.slew.apply(joint, limited, dt_s);
        }
        self.dispatch_all(&targets);
    }

    /// Position of the bin actuator.
    #[inline]
    pub fn get_bin_state(&self) -> f64 {
        self.state.position[Joint::Bin]
    }

    /// Arm pose `[turntable, lower_arm, upper_arm, scoop]`.
    pub fn get_arm_state(&self) -> [f64; ARM_JOINT_COUNT] {
        Joint::ARM.map(|joint| self.state.position[joint])
    }

    /// Replace every command with its safe-state value and dispatch immediately.
    ///
    /// Used on disable and emergency stop; bypasses the slew limiter.
    pub fn clear_commands(&mut self) {
        let safe = self.clamp.safe_state(&self.state.position);
        self.commands = safe;
        self.slew.reset(&safe);
        self.dispatch_all(&safe);
        info!("Commands cleared to safe state");
    }

    /// Enable or disable command dispatch.
    ///
    /// Disabling also resets the command array to safe-state values so a
    /// later enable does not replay stale commands.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if !enabled {
            self.commands = self.clamp.safe_state(&self.state.position);
        }
        info!("Bridge {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Whether `write()` dispatches real commands.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Declare the turntable's current physical position to be zero.
    pub fn zero_turntable(&mut self) -> Option<CalibrationEntry> {
        self.rezero(Joint::Turntable, 0.0)
    }

    /// Re-anchor `joint` so its current raw reading maps to `joint_value`.
    ///
    /// The reported position and the joint's command follow immediately, so
    /// the next `write()` holds the joint where it is. Returns `None` (and
    /// leaves calibration untouched) for velocity-driven joints and joints
    /// that have never reported a position.
    pub fn rezero(&mut self, joint: Joint, joint_value: f64) -> Option<CalibrationEntry> {
        if self.joints[joint].drive == DriveMode::Velocity {
            warn!("Cannot rezero velocity-driven joint {}", joint);
            return None;
        }
        let sample = self.cache.snapshot(joint);
        if !sample.has_position() {
            warn!("Cannot rezero {}: no position reading yet", joint);
            return None;
        }

        let entry = self.calibration.rezero(joint, sample.position_raw, joint_value);
        let position = self.calibration.to_joint_space(joint, sample.position_raw);
        self.state.position[joint] = position;
        self.state.reported[joint] = true;
        self.commands[joint] = position;
        Some(entry)
    }

    /// Time of the latest sample of any kind for `joint`.
    pub fn last_update(&self, joint: Joint) -> Option<Instant> {
        let cached = self.cache.snapshot(joint).last_update_time();
        let counted = self
            .velocity
            .is_tracked(joint)
            .then(|| self.velocity.accumulator(joint))
            .and_then(|acc| acc.last_sample_time);
        cached.max(counted)
    }

    /// Current calibration table.
    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    /// Raw values sent by the last dispatch.
    pub fn dispatched(&self) -> &JointMap<f64> {
        &self.dispatched
    }

    /// Number of transport sends that failed.
    pub fn dispatch_failures(&self) -> u64 {
        self.dispatch_failures
    }

    /// Number of non-finite commands replaced by safe-state values.
    pub fn coerced_commands(&self) -> u64 {
        self.coerced_commands
    }

    /// Dispatch safe-state and release the transport.
    ///
    /// # Errors
    /// Propagates the transport's shutdown error.
    pub fn shutdown(&mut self) -> Result<(), HalError> {
        info!("Shutdown requested");
        self.clear_commands();
        self.transport.shutdown()
    }

    fn dispatch_all(&mut self, values: &JointMap<f64>) {
        for joint in Joint::ALL {
            let raw = self.clamp.prepare(&self.calibration, joint, values[joint]);
            self.dispatched[joint] = raw;
            if let Err(e) = self.transport.send(RawCommand::new(joint, raw)) {
                self.dispatch_failures += 1;
                if self.dispatch_failures <= 10 || self.dispatch_failures % 1000 == 0 {
                    warn!("Dispatch failure #{} for {}: {}", self.dispatch_failures, joint, e);
                }
            }
        }
        debug!("Dispatched {:?}", self.dispatched.as_array());
    }
}
