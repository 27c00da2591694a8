//! Raw ↔ joint-space calibration.
//!
//! Every joint maps hardware units to joint units through a two-point linear
//! [`CalibrationEntry`]. Inputs beyond the configured span are clamped to it
//! before interpolating, so a noisy or faulty sensor can never report a joint
//! value outside `[joint_min, joint_max]`, and a runaway command can never
//! produce a raw value outside `[encoder_min, encoder_max]`. Out-of-range
//! input is not an error.

use exca_common::hal::config::{CalibrationEntry, JointConfig};
use exca_common::hal::transport::HalError;
use exca_common::joint::{Joint, JointMap};
use tracing::info;

/// Fraction of the way from `from` to `to` that `x` lies, clamped to `[0, 1]`.
///
/// Handles `from > to` (inverted spans).
#[inline]
fn span_fraction(x: f64, from: f64, to: f64) -> f64 {
    ((x - from) / (to - from)).clamp(0.0, 1.0)
}

/// Blend between `a` and `b`; exact at both ends.
#[inline]
fn lerp(t: f64, a: f64, b: f64) -> f64 {
    (1.0 - t) * a + t * b
}

/// Map a raw reading to joint space, clamping to the encoder span first.
#[inline]
pub fn to_joint_space(entry: &CalibrationEntry, raw: f64) -> f64 {
    let t = span_fraction(raw, entry.encoder_min, entry.encoder_max);
    lerp(t, entry.joint_min, entry.joint_max)
}

/// Map a joint-space value to hardware units, clamping to the joint range first.
#[inline]
pub fn to_hardware_units(entry: &CalibrationEntry, value: f64) -> f64 {
    let t = span_fraction(value, entry.joint_min, entry.joint_max);
    lerp(t, entry.encoder_min, entry.encoder_max)
}

/// Per-joint calibration entries.
///
/// Read-only on the tick path; only [`CalibrationTable::rezero`] mutates it.
#[derive(Debug, Clone)]
pub struct CalibrationTable {
    entries: JointMap<CalibrationEntry>,
}

impl CalibrationTable {
    /// Create a table from per-joint entries.
    ///
    /// # Errors
    /// Returns `HalError::ConfigError` if any entry violates its invariants.
    pub fn new(entries: JointMap<CalibrationEntry>) -> Result<Self, HalError> {
        for (joint, entry) in entries.iter() {
            entry.validate(joint)?;
        }
        Ok(Self { entries })
    }

    /// Create a table from per-joint configuration.
    pub fn from_config(joints: &JointMap<JointConfig>) -> Result<Self, HalError> {
        Self::new(JointMap::from_fn(|joint| joints[joint].calibration()))
    }

    /// Calibration entry for `joint`.
    #[inline]
    pub fn entry(&self, joint: Joint) -> &CalibrationEntry {
        &self.entries[joint]
    }

    /// Raw reading → joint space for `joint`.
    #[inline]
    pub fn to_joint_space(&self, joint: Joint, raw: f64) -> f64 {
        to_joint_space(&self.entries[joint], raw)
    }

    /// Joint space → hardware units for `joint`.
    #[inline]
    pub fn to_hardware_units(&self, joint: Joint, value: f64) -> f64 {
        to_hardware_units(&self.entries[joint], value)
    }

    /// Re-anchor `joint` so that the current raw reading maps to `joint_value`.
    ///
    /// Both encoder bounds shift by the same offset, so the span (and scale)
    /// is unchanged. `joint_value` is clamped to the joint range. Returns the
    /// new entry.
    pub fn rezero(&mut self, joint: Joint, raw_now: f64, joint_value: f64) -> CalibrationEntry {
        let entry = &mut self.entries[joint];
        let anchor = to_hardware_units(entry, joint_value);
        let offset = raw_now - anchor;
        entry.encoder_min += offset;
        entry.encoder_max += offset;

        info!(
            "Re-anchored {} by {:+.3} raw units: encoder [{:.3}, {:.3}]",
            joint, offset, entry.encoder_min, entry.encoder_max
        );
        *entry
    }
}
