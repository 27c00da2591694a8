//! System-wide constants for the EXCA workspace.
//!
//! Single source of truth for numeric limits and default paths.

use static_assertions::const_assert;

/// Number of joints on the robot (fixed at compile time).
pub const JOINT_COUNT: usize = 7;

/// Number of joints reported by the arm pose accessor.
pub const ARM_JOINT_COUNT: usize = 4;

/// Default control tick in microseconds (10 Hz, the CAN bridge publish rate).
pub const DEFAULT_CYCLE_TIME_US: u32 = 100_000;

/// Quadrature counts per motor revolution of the brushless tread controllers.
pub const BRUSHLESS_COUNTS_PER_REVOLUTION: f64 = 12_800.0;

/// Radians per revolution.
pub const RADIANS_PER_REVOLUTION: f64 = std::f64::consts::TAU;

/// Elapsed windows shorter than this are treated as empty (seconds).
pub const MIN_VELOCITY_WINDOW_S: f64 = 1e-6;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/exca/bridge.toml";

/// Default transport name.
pub const DEFAULT_TRANSPORT: &str = "simulation";

const_assert!(ARM_JOINT_COUNT < JOINT_COUNT);
const_assert!(DEFAULT_CYCLE_TIME_US > 0);
