//! Bridge configuration types.
//!
//! - `BridgeConfig` - Main configuration loaded from bridge.toml
//! - `JointConfig` - Per-joint calibration, drive mode and limits
//! - `CalibrationEntry` - Two-point raw ↔ joint-space mapping

use crate::config::SharedConfig;
use crate::consts::{BRUSHLESS_COUNTS_PER_REVOLUTION, DEFAULT_CYCLE_TIME_US, DEFAULT_TRANSPORT};
use crate::hal::transport::HalError;
use crate::joint::{DriveMode, Joint, JointMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::TAU;

fn default_cycle_time_us() -> u32 {
    DEFAULT_CYCLE_TIME_US
}

fn default_counts_per_revolution() -> f64 {
    BRUSHLESS_COUNTS_PER_REVOLUTION
}

fn default_transport() -> String {
    DEFAULT_TRANSPORT.to_string()
}

/// Two-point linear mapping between raw hardware units and joint space.
///
/// `encoder_min` may be greater than `encoder_max` for inverted sensor
/// mounting; the two must never be equal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    /// Raw reading at `joint_min`.
    pub encoder_min: f64,
    /// Raw reading at `joint_max`.
    pub encoder_max: f64,
    /// Lower joint-space bound.
    pub joint_min: f64,
    /// Upper joint-space bound.
    pub joint_max: f64,
}

impl CalibrationEntry {
    /// Create a new entry.
    pub const fn new(encoder_min: f64, encoder_max: f64, joint_min: f64, joint_max: f64) -> Self {
        Self {
            encoder_min,
            encoder_max,
            joint_min,
            joint_max,
        }
    }

    /// Check the entry invariants for `joint`.
    pub fn validate(&self, joint: Joint) -> Result<(), HalError> {
        let bounds = [self.encoder_min, self.encoder_max, self.joint_min, self.joint_max];
        if bounds.iter().any(|v| !v.is_finite()) {
            return Err(HalError::ConfigError(format!(
                "Joint '{joint}': calibration bounds must be finite"
            )));
        }
        if self.encoder_min == self.encoder_max {
            return Err(HalError::ConfigError(format!(
                "Joint '{joint}': encoder_min and encoder_max must differ (both {})",
                self.encoder_min
            )));
        }
        if self.joint_min >= self.joint_max {
            return Err(HalError::ConfigError(format!(
                "Joint '{joint}': joint_min ({}) must be < joint_max ({})",
                self.joint_min, self.joint_max
            )));
        }
        Ok(())
    }
}

/// Per-joint configuration, one `[joints.<name>]` table each.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointConfig {
    /// Whether commands are positions or velocities.
    #[serde(default)]
    pub drive: DriveMode,

    /// Raw reading at `joint_min`.
    pub encoder_min: f64,

    /// Raw reading at `joint_max`.
    pub encoder_max: f64,

    /// Lower joint-space bound (also the lower command limit).
    pub joint_min: f64,

    /// Upper joint-space bound (also the upper command limit).
    pub joint_max: f64,

    /// Position reported before the joint's first sample arrives.
    #[serde(default)]
    pub idle_value: f64,

    /// Joint has an incremental quadrature counter feeding the velocity estimator.
    #[serde(default)]
    pub quadrature: bool,

    /// Wheel radius in metres; quadrature velocity and odometry become linear.
    #[serde(default)]
    pub wheel_radius: Option<f64>,

    /// Maximum change of commanded velocity per second (velocity joints only).
    #[serde(default)]
    pub max_acceleration: Option<f64>,
}

impl JointConfig {
    /// Calibration entry for this joint.
    pub const fn calibration(&self) -> CalibrationEntry {
        CalibrationEntry::new(self.encoder_min, self.encoder_max, self.joint_min, self.joint_max)
    }

    /// Position-driven joint with the given calibration.
    pub const fn position(calibration: CalibrationEntry, idle_value: f64) -> Self {
        Self {
            drive: DriveMode::Position,
            encoder_min: calibration.encoder_min,
            encoder_max: calibration.encoder_max,
            joint_min: calibration.joint_min,
            joint_max: calibration.joint_max,
            idle_value,
            quadrature: false,
            wheel_radius: None,
            max_acceleration: None,
        }
    }

    /// Velocity-driven joint with a quadrature counter.
    pub const fn tread(calibration: CalibrationEntry) -> Self {
        Self {
            drive: DriveMode::Velocity,
            encoder_min: calibration.encoder_min,
            encoder_max: calibration.encoder_max,
            joint_min: calibration.joint_min,
            joint_max: calibration.joint_max,
            idle_value: 0.0,
            quadrature: true,
            wheel_radius: None,
            max_acceleration: None,
        }
    }

    /// Validate the joint configuration.
    ///
    /// # Validation Rules
    /// 1. Calibration bounds finite, `encoder_min != encoder_max`, `joint_min < joint_max`
    /// 2. `idle_value` within `[joint_min, joint_max]`
    /// 3. `wheel_radius` > 0 if set
    /// 4. `max_acceleration` > 0 if set, and only on velocity-driven joints
    /// 5. velocity-driven joints can command zero (`joint_min <= 0 <= joint_max`)
    pub fn validate(&self, joint: Joint) -> Result<(), HalError> {
        self.calibration().validate(joint)?;

        if self.drive == DriveMode::Velocity && !(self.joint_min <= 0.0 && 0.0 <= self.joint_max) {
            return Err(HalError::ConfigError(format!(
                "Joint '{joint}': velocity range [{}, {}] must contain zero",
                self.joint_min, self.joint_max
            )));
        }

        if !(self.joint_min..=self.joint_max).contains(&self.idle_value) {
            return Err(HalError::ConfigError(format!(
                "Joint '{joint}': idle_value {} outside [{}, {}]",
                self.idle_value, self.joint_min, self.joint_max
            )));
        }

        if self.wheel_radius.is_some_and(|r| !(r.is_finite() && r > 0.0)) {
            return Err(HalError::ConfigError(format!(
                "Joint '{joint}': wheel_radius must be > 0"
            )));
        }

        if let Some(accel) = self.max_acceleration {
            if !(accel.is_finite() && accel > 0.0) {
                return Err(HalError::ConfigError(format!(
                    "Joint '{joint}': max_acceleration must be > 0"
                )));
            }
            if self.drive != DriveMode::Velocity {
                return Err(HalError::ConfigError(format!(
                    "Joint '{joint}': max_acceleration only applies to velocity-driven joints"
                )));
            }
        }

        Ok(())
    }
}

/// Main configuration loaded from `bridge.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Logging and instance identity.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Control tick in microseconds.
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u32,

    /// Quadrature counts per revolution for velocity estimation.
    #[serde(default = "default_counts_per_revolution")]
    pub counts_per_revolution: f64,

    /// Transport to create at startup (e.g. "simulation").
    #[serde(default = "default_transport")]
    pub transport: String,

    /// Whether `write()` dispatches real commands from the first tick.
    #[serde(default)]
    pub start_enabled: bool,

    /// Per-joint configuration keyed by joint name. Every joint must be present.
    #[serde(default)]
    pub joints: BTreeMap<String, JointConfig>,
}

impl BridgeConfig {
    /// Validate the bridge configuration.
    ///
    /// # Validation Rules
    /// 1. `cycle_time_us` > 0
    /// 2. `counts_per_revolution` finite and > 0
    /// 3. `transport` not empty
    /// 4. every joint configured, each passing `JointConfig::validate`
    /// 5. no unknown joint names
    pub fn validate(&self) -> Result<(), HalError> {
        if self.cycle_time_us == 0 {
            return Err(HalError::ConfigError(
                "cycle_time_us must be greater than 0".to_string(),
            ));
        }

        if !(self.counts_per_revolution.is_finite() && self.counts_per_revolution > 0.0) {
            return Err(HalError::ConfigError(format!(
                "counts_per_revolution must be > 0 (got {})",
                self.counts_per_revolution
            )));
        }

        if self.transport.is_empty() {
            return Err(HalError::ConfigError("transport cannot be empty".to_string()));
        }

        self.shared
            .validate()
            .map_err(|e| HalError::ConfigError(e.to_string()))?;

        if let Some(unknown) = self.joints.keys().find(|name| name.parse::<Joint>().is_err()) {
            return Err(HalError::ConfigError(format!("Unknown joint '{unknown}'")));
        }

        for joint in Joint::ALL {
            let Some(joint_config) = self.joint(joint) else {
                return Err(HalError::ConfigError(format!(
                    "Missing configuration for joint '{joint}'"
                )));
            };
            joint_config.validate(joint)?;
        }

        Ok(())
    }

    /// Configuration for one joint, if present.
    pub fn joint(&self, joint: Joint) -> Option<&JointConfig> {
        self.joints.get(joint.name())
    }

    /// Per-joint configuration as a dense table.
    ///
    /// # Errors
    /// Returns `HalError::ConfigError` if any joint is missing.
    pub fn joint_table(&self) -> Result<JointMap<JointConfig>, HalError> {
        let mut missing = None;
        let table = JointMap::from_fn(|joint| match self.joint(joint) {
            Some(cfg) => *cfg,
            None => {
                missing.get_or_insert(joint);
                JointConfig::position(CalibrationEntry::new(0.0, 1.0, 0.0, 1.0), 0.0)
            }
        });
        match missing {
            Some(joint) => Err(HalError::ConfigError(format!(
                "Missing configuration for joint '{joint}'"
            ))),
            None => Ok(table),
        }
    }
}

impl Default for BridgeConfig {
    /// Factory calibration of the robot.
    fn default() -> Self {
        let tread = JointConfig::tread(CalibrationEntry::new(-1000.0, 1000.0, -TAU, TAU));
        let joints = [
            (Joint::LeftTread, tread),
            (Joint::RightTread, tread),
            (
                Joint::Bin,
                JointConfig::position(CalibrationEntry::new(0.0, 47104.0, 0.0, 6.28), 0.0),
            ),
            (
                Joint::Turntable,
                JointConfig::position(CalibrationEntry::new(-308224.0, 308224.0, -TAU, TAU), 0.0),
            ),
            (
                Joint::LowerArm,
                JointConfig::position(CalibrationEntry::new(5.2, 1.2, 0.104, 1.55), 0.104),
            ),
            (
                Joint::UpperArm,
                JointConfig::position(CalibrationEntry::new(5.2, 1.2, 0.98, 2.4), 0.98),
            ),
            (
                Joint::Scoop,
                JointConfig::position(CalibrationEntry::new(3.72, 1.2, -1.16614, 1.62), 0.0),
            ),
        ]
        .into_iter()
        .map(|(joint, cfg)| (joint.name().to_string(), cfg))
        .collect();

        Self {
            shared: SharedConfig::default(),
            cycle_time_us: DEFAULT_CYCLE_TIME_US,
            counts_per_revolution: BRUSHLESS_COUNTS_PER_REVOLUTION,
            transport: default_transport(),
            start_enabled: false,
            joints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;

    #[test]
    fn test_default_config_is_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.joints.len(), Joint::ALL.len());
        assert!(config.joint_table().is_ok());
    }

    #[test]
    fn test_validate_cycle_time_zero() {
        let mut config = BridgeConfig::default();
        config.cycle_time_us = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_counts_per_revolution() {
        let mut config = BridgeConfig::default();
        config.counts_per_revolution = 0.0;
        assert!(config.validate().is_err());
        config.counts_per_revolution = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_missing_joint() {
        let mut config = BridgeConfig::default();
        config.joints.remove("scoop");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scoop"));
        assert!(config.joint_table().is_err());
    }

    #[test]
    fn test_validate_equal_encoder_bounds() {
        let mut config = BridgeConfig::default();
        config.joints.insert(
            "bin".to_string(),
            JointConfig::position(CalibrationEntry::new(0.0, 0.0, 0.0, 1.0), 0.0),
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_inverted_encoder_span_is_valid() {
        let entry = CalibrationEntry::new(5.2, 1.2, 0.104, 1.55);
        assert!(entry.validate(Joint::LowerArm).is_ok());
    }

    #[test]
    fn test_validate_joint_bounds_order() {
        let entry = CalibrationEntry::new(0.0, 10.0, 1.0, 1.0);
        assert!(entry.validate(Joint::Bin).is_err());
    }

    #[test]
    fn test_validate_idle_value_out_of_range() {
        let cfg = JointConfig::position(CalibrationEntry::new(0.0, 10.0, 0.0, 1.0), 2.0);
        assert!(cfg.validate(Joint::Bin).is_err());
    }

    #[test]
    fn test_validate_acceleration_on_position_joint() {
        let mut cfg = JointConfig::position(CalibrationEntry::new(0.0, 10.0, 0.0, 1.0), 0.0);
        cfg.max_acceleration = Some(1.0);
        assert!(cfg.validate(Joint::Bin).is_err());

        let mut tread = JointConfig::tread(CalibrationEntry::new(-1000.0, 1000.0, -1.0, 1.0));
        tread.max_acceleration = Some(1.0);
        assert!(tread.validate(Joint::LeftTread).is_ok());
        tread.wheel_radius = Some(-0.1);
        assert!(tread.validate(Joint::LeftTread).is_err());
    }

    #[test]
    fn test_validate_velocity_range_contains_zero() {
        let tread = JointConfig::tread(CalibrationEntry::new(0.0, 1000.0, 0.5, 2.0));
        assert!(tread.validate(Joint::RightTread).is_err());
    }

    #[test]
    fn test_parse_toml() {
        let mut text = String::from(
            r#"
cycle_time_us = 20000
counts_per_revolution = 4096
transport = "simulation"
start_enabled = true

[shared]
log_level = "debug"
"#,
        );
        for joint in Joint::ALL {
            text.push_str(&format!(
                "\n[joints.{joint}]\nencoder_min = 0\nencoder_max = 100\njoint_min = -1.0\njoint_max = 1.0\n"
            ));
        }

        let config = BridgeConfig::parse(&text).unwrap();
        assert_eq!(config.cycle_time_us, 20000);
        assert_eq!(config.counts_per_revolution, 4096.0);
        assert!(config.start_enabled);
        assert_eq!(config.joints["scoop"].drive, DriveMode::Position);
        assert_eq!(config.joints["bin"].encoder_max, 100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_unknown_joint_name() {
        let mut config = BridgeConfig::default();
        let bin = *config.joint(Joint::Bin).unwrap();
        config.joints.insert("elbow".to_string(), bin);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("elbow"));
    }

    #[test]
    fn test_parse_velocity_joint_options() {
        let text = r#"
[joints.left_tread]
drive = "velocity"
quadrature = true
wheel_radius = 0.2
max_acceleration = 2.5
encoder_min = -1000
encoder_max = 1000
joint_min = -3.0
joint_max = 3.0
"#;
        let config = BridgeConfig::parse(text).unwrap();
        let tread = config.joints["left_tread"];
        assert_eq!(tread.drive, DriveMode::Velocity);
        assert!(tread.quadrature);
        assert_eq!(tread.wheel_radius, Some(0.2));
        assert_eq!(tread.max_acceleration, Some(2.5));
        // Other joints are missing.
        assert!(config.validate().is_err());
    }
}
