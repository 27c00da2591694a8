//! Prelude module for common re-exports.
//!
//! ```rust
//! use exca_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};
pub use crate::hal::config::{BridgeConfig, CalibrationEntry, JointConfig};

// ─── Joints ─────────────────────────────────────────────────────────
pub use crate::joint::{DriveMode, Joint, JointMap};

// ─── Transport ──────────────────────────────────────────────────────
pub use crate::hal::transport::{HalError, Transport};
pub use crate::hal::types::{JointState, RawCommand};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{ARM_JOINT_COUNT, DEFAULT_CYCLE_TIME_US, JOINT_COUNT};
