//! Command safety clamp and drivebase slew limiter.
//!
//! The clamp is the last stage before a command leaves the bridge:
//!
//! ```text
//! commanded value ──► finite? ──► [joint_min, joint_max] ──► slew ──► to_hardware_units ──► transport
//!                       │ no
//!                       └──► safe value (0 velocity / hold position)
//! ```
//!
//! The calibration mapping clamps again on the raw side, so a raw command
//! can never leave `[encoder_min, encoder_max]` whatever the caller wrote.

use crate::calibration::CalibrationTable;
use exca_common::hal::config::JointConfig;
use exca_common::joint::{DriveMode, Joint, JointMap};

/// Per-joint clamp bound to the drive mode and joint range of each joint.
#[derive(Debug, Clone)]
pub struct CommandClamp {
    drive: JointMap<DriveMode>,
    range: JointMap<(f64, f64)>,
}

impl CommandClamp {
    /// Create a clamp from per-joint configuration.
    pub fn new(joints: &JointMap<JointConfig>) -> Self {
        Self {
            drive: JointMap::from_fn(|j| joints[j].drive),
            range: JointMap::from_fn(|j| (joints[j].joint_min, joints[j].joint_max)),
        }
    }

    /// Drive mode of `joint`.
    #[inline]
    pub fn drive(&self, joint: Joint) -> DriveMode {
        self.drive[joint]
    }

    /// Neutral command for `joint`: 0 for velocity joints, `position` otherwise.
    #[inline]
    pub fn safe_value(&self, joint: Joint, position: f64) -> f64 {
        match self.drive[joint] {
            DriveMode::Velocity => 0.0,
            DriveMode::Position => self.limit(joint, position),
        }
    }

    /// Neutral commands for every joint, holding `positions`.
    pub fn safe_state(&self, positions: &JointMap<f64>) -> JointMap<f64> {
        JointMap::from_fn(|j| self.safe_value(j, positions[j]))
    }

    /// Clamp a joint-space command to the joint range.
    ///
    /// Non-finite input is the caller's job; `limit` passes NaN through.
    #[inline]
    pub fn limit(&self, joint: Joint, value: f64) -> f64 {
        let (lo, hi) = self.range[joint];
        value.clamp(lo, hi)
    }

    /// Clamp a joint-space command and convert it to hardware units.
    #[inline]
    pub fn prepare(&self, table: &CalibrationTable, joint: Joint, value: f64) -> f64 {
        table.to_hardware_units(joint, self.limit(joint, value))
    }
}

/// Rate limiter on commanded velocity for joints with `max_acceleration`.
#[derive(Debug, Clone)]
pub struct SlewLimiter {
    max_acceleration: JointMap<Option<f64>>,
    previous: JointMap<f64>,
}

impl SlewLimiter {
    /// Create a limiter; joints without `max_acceleration` pass through.
    pub fn new(joints: &JointMap<JointConfig>) -> Self {
        Self {
            max_acceleration: JointMap::from_fn(|j| joints[j].max_acceleration),
            previous: JointMap::splat(0.0),
        }
    }

    /// Whether `joint` is rate limited.
    #[inline]
    pub fn is_limited(&self, joint: Joint) -> bool {
        self.max_acceleration[joint].is_some()
    }

    /// Move `joint`'s output towards `target` by at most `max_acceleration * dt_s`.
    pub fn apply(&mut self, joint: Joint, target: f64, dt_s: f64) -> f64 {
        let Some(max_accel) = self.max_acceleration[joint] else {
            self.previous[joint] = target;
            return target;
        };
        let step = max_accel * dt_s.max(0.0);
        let previous = self.previous[joint];
        let out = target.clamp(previous - step, previous + step);
        self.previous[joint] = out;
        out
    }

    /// Forget the ramp and continue from `values`.
    pub fn reset(&mut self, values: &JointMap<f64>) {
        self.previous = *values;
    }

    /// Last output for `joint`.
    #[inline]
    pub fn previous(&self, joint: Joint) -> f64 {
        self.previous[joint]
    }
}
