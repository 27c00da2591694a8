//! Values exchanged between the bridge, the joint controller and the transport.
//!
//! - `JointState` - Position / velocity / effort snapshot produced by `read()`
//! - `RawCommand` - One hardware-unit command handed to the transport

use crate::joint::{Joint, JointMap};

/// Joint-space feedback for one tick, indexed by [`Joint`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointState {
    /// Position in joint units (rad or m)
    pub position: JointMap<f64>,
    /// Velocity in joint units per second
    pub velocity: JointMap<f64>,
    /// Torque / motor current as reported by the drive
    pub effort: JointMap<f64>,
    /// `position` comes from a reading or odometry, not the configured idle value
    pub reported: JointMap<bool>,
}

/// Command in hardware units for a single joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawCommand {
    /// Target joint
    pub joint: Joint,
    /// Value in the actuator driver's native units
    pub value: f64,
}

impl RawCommand {
    /// Create a new raw command.
    pub const fn new(joint: Joint, value: f64) -> Self {
        Self { joint, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_state_default() {
        let state = JointState::default();
        for joint in Joint::ALL {
            assert_eq!(state.position[joint], 0.0);
            assert_eq!(state.velocity[joint], 0.0);
            assert_eq!(state.effort[joint], 0.0);
            assert!(!state.reported[joint]);
        }
    }

    #[test]
    fn test_raw_command_new() {
        let cmd = RawCommand::new(Joint::Turntable, -42.0);
        assert_eq!(cmd.joint, Joint::Turntable);
        assert_eq!(cmd.value, -42.0);
    }
}
