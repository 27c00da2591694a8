//! Latest-value sensor cache and the producer-side input handle.
//!
//! Each joint owns one `Mutex<SensorSample>`. Producers hold a joint's lock
//! only long enough to store a couple of scalars; the control loop holds it
//! only long enough to copy the sample out. All calibration math runs after
//! the lock is released.
//!
//! ```text
//!  producer (turntable) ──► [Mutex<SensorSample>] turntable ─┐
//!  producer (lower arm) ──► [Mutex<SensorSample>] lower_arm ─┼─► snapshot() ─► BridgeCore::read()
//!  producer (treads)    ──► [Mutex<VelocityAccumulator>] ... ─┘
//! ```

use crate::velocity::VelocityEstimator;
use exca_common::joint::{Joint, JointMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, trace};

/// Lock a per-joint slot, recovering the data if a producer panicked.
///
/// Slots only hold plain scalars, so a poisoned slot is still consistent.
#[inline]
pub(crate) fn lock_slot<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Latest raw readings for one joint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSample {
    /// Last raw position reading
    pub position_raw: f64,
    /// Last raw torque / current reading
    pub torque_raw: f64,
    /// When `position_raw` was last written (`None` = never)
    pub position_time: Option<Instant>,
    /// When `torque_raw` was last written (`None` = never)
    pub torque_time: Option<Instant>,
}

impl SensorSample {
    /// Most recent write of either field.
    pub fn last_update_time(&self) -> Option<Instant> {
        match (self.position_time, self.torque_time) {
            (Some(p), Some(t)) => Some(p.max(t)),
            (p, t) => p.or(t),
        }
    }

    /// Whether a position reading has ever arrived.
    #[inline]
    pub fn has_position(&self) -> bool {
        self.position_time.is_some()
    }
}

/// Thread-safe latest-value store, one lock per joint.
#[derive(Debug, Default)]
pub struct SensorCache {
    slots: JointMap<Mutex<SensorSample>>,
}

impl SensorCache {
    /// Create an empty cache (no joint has been written).
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw position reading for `joint`.
    ///
    /// NaN is dropped and the previous reading stays; a NaN would otherwise
    /// survive clamping.
    pub fn set_position(&self, joint: Joint, raw: f64, time: Instant) {
        if raw.is_nan() {
            debug!("Dropping NaN position for {}", joint);
            return;
        }
        let mut slot = lock_slot(&self.slots[joint]);
        slot.position_raw = raw;
        slot.position_time = Some(time);
    }

    /// Store a raw torque / current reading for `joint`. NaN is dropped.
    pub fn set_torque(&self, joint: Joint, raw: f64, time: Instant) {
        if raw.is_nan() {
            debug!("Dropping NaN torque for {}", joint);
            return;
        }
        let mut slot = lock_slot(&self.slots[joint]);
        slot.torque_raw = raw;
        slot.torque_time = Some(time);
    }

    /// Store position and torque for `joint` under a single lock hold.
    ///
    /// The pair is dropped if either value is NaN.
    pub fn set_sample(&self, joint: Joint, position_raw: f64, torque_raw: f64, time: Instant) {
        if position_raw.is_nan() || torque_raw.is_nan() {
            debug!("Dropping NaN sample for {}", joint);
            return;
        }
        let mut slot = lock_slot(&self.slots[joint]);
        slot.position_raw = position_raw;
        slot.torque_raw = torque_raw;
        slot.position_time = Some(time);
        slot.torque_time = Some(time);
    }

    /// Consistent copy of `joint`'s latest sample.
    #[inline]
    pub fn snapshot(&self, joint: Joint) -> SensorSample {
        *lock_slot(&self.slots[joint])
    }
}

/// Cloneable handle through which producers deliver raw samples.
///
/// Every method takes `&self` and never blocks beyond one per-joint lock hold.
#[derive(Debug, Clone)]
pub struct SensorInputs {
    cache: Arc<SensorCache>,
    velocity: Arc<VelocityEstimator>,
}

impl SensorInputs {
    /// Create a handle over a shared cache and estimator.
    pub fn new(cache: Arc<SensorCache>, velocity: Arc<VelocityEstimator>) -> Self {
        Self { cache, velocity }
    }

    /// Raw position event.
    pub fn on_position(&self, joint: Joint, raw: f64, time: Instant) {
        trace!("{} position_raw={}", joint, raw);
        self.cache.set_position(joint, raw, time);
    }

    /// Raw torque / current event.
    pub fn on_torque(&self, joint: Joint, raw: f64, time: Instant) {
        trace!("{} torque_raw={}", joint, raw);
        self.cache.set_torque(joint, raw, time);
    }

    /// Position and torque captured together.
    pub fn on_sample(&self, joint: Joint, position_raw: f64, torque_raw: f64, time: Instant) {
        self.cache.set_sample(joint, position_raw, torque_raw, time);
    }

    /// Incremental quadrature count event.
    pub fn on_count_delta(&self, joint: Joint, delta_count: i64, time: Instant) {
        self.velocity.accumulate(joint, delta_count, time);
    }

    /// Absolute 32-bit quadrature counter event.
    pub fn on_absolute_count(&self, joint: Joint, count: i32, time: Instant) {
        self.velocity.record_absolute(joint, count, time);
    }

    /// Shared cache behind this handle.
    pub fn cache(&self) -> &Arc<SensorCache> {
        &self.cache
    }

    /// Shared velocity estimator behind this handle.
    pub fn velocity(&self) -> &Arc<VelocityEstimator> {
        &self.velocity
    }
}
