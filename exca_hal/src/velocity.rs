//! Quadrature velocity estimation.
//!
//! Producers report incremental counts whenever the motor controller
//! publishes them; the control loop drains once per tick. Counts are summed
//! over the whole inter-tick window and divided by the window length, which
//! averages out the quantization of any single small delta sampled at an
//! arbitrary phase of the producer's clock.
//!
//! ```text
//! velocity = (Σ delta / counts_per_revolution) · units_per_revolution / (t_end − t_start)
//! ```
//!
//! `units_per_revolution` is 2π (rad/s), or 2π·r (m/s) for joints with a
//! configured wheel radius.

use crate::sensor_cache::lock_slot;
use exca_common::consts::{MIN_VELOCITY_WINDOW_S, RADIANS_PER_REVOLUTION};
use exca_common::hal::config::JointConfig;
use exca_common::joint::{Joint, JointMap};
use std::sync::Mutex;
use std::time::Instant;
use tracing::trace;

/// Per-joint count accumulator for one inter-tick window.
#[derive(Debug, Clone, Copy)]
pub struct VelocityAccumulator {
    /// Sum of deltas since the last drain
    pub accumulated_delta_count: i64,
    /// Number of deltas since the last drain
    pub sample_count: u32,
    /// Start of the current window (time of the last drain)
    pub window_start_time: Instant,
    /// Timestamp of the newest delta in the window
    pub window_end_time: Option<Instant>,
    /// Sum of every delta ever accumulated (odometry)
    pub total_count: i64,
    /// Timestamp of the newest delta ever accumulated (`None` = never)
    pub last_sample_time: Option<Instant>,
    /// Last absolute counter value, for absolute → delta conversion
    last_absolute: Option<i32>,
}

impl VelocityAccumulator {
    /// Empty accumulator whose first window starts at `start`.
    pub fn new(start: Instant) -> Self {
        Self {
            accumulated_delta_count: 0,
            sample_count: 0,
            window_start_time: start,
            window_end_time: None,
            total_count: 0,
            last_sample_time: None,
            last_absolute: None,
        }
    }

    fn accumulate(&mut self, delta: i64, time: Instant) {
        self.accumulated_delta_count = self.accumulated_delta_count.saturating_add(delta);
        self.sample_count = self.sample_count.saturating_add(1);
        self.total_count = self.total_count.saturating_add(delta);
        self.last_sample_time = Some(match self.last_sample_time {
            Some(last) if last > time => last,
            _ => time,
        });
        self.window_end_time = Some(match self.window_end_time {
            Some(end) if end > time => end,
            _ => time,
        });
    }

    /// Take the window's counts and elapsed seconds, and start a new window at `now`.
    fn take_window(&mut self, now: Instant) -> (i64, f64) {
        let counts = self.accumulated_delta_count;
        let elapsed = if self.sample_count == 0 {
            0.0
        } else {
            let end = self.window_end_time.unwrap_or(now);
            let span = end.saturating_duration_since(self.window_start_time).as_secs_f64();
            if span >= MIN_VELOCITY_WINDOW_S {
                span
            } else {
                // Deltas stamped at (or before) the window start: fall back to the tick interval.
                now.saturating_duration_since(self.window_start_time).as_secs_f64()
            }
        };

        self.accumulated_delta_count = 0;
        self.sample_count = 0;
        self.window_start_time = now;
        self.window_end_time = None;

        (counts, elapsed)
    }
}

/// Velocity estimator for every quadrature-encoded joint.
///
/// Shared between producers (`accumulate`, `record_absolute`) and the control
/// loop (`drain`). One lock per joint; producers for different joints never
/// contend.
#[derive(Debug)]
pub struct VelocityEstimator {
    counts_per_revolution: f64,
    units_per_revolution: JointMap<f64>,
    tracked: JointMap<bool>,
    slots: JointMap<Mutex<VelocityAccumulator>>,
}

impl VelocityEstimator {
    /// Create an estimator for the joints flagged `quadrature` in `joints`.
    ///
    /// Every window initially starts at `start`.
    pub fn new(counts_per_revolution: f64, joints: &JointMap<JointConfig>, start: Instant) -> Self {
        Self {
            counts_per_revolution,
            units_per_revolution: JointMap::from_fn(|j| {
                RADIANS_PER_REVOLUTION * joints[j].wheel_radius.unwrap_or(1.0)
            }),
            tracked: JointMap::from_fn(|j| joints[j].quadrature),
            slots: JointMap::from_fn(|_| Mutex::new(VelocityAccumulator::new(start))),
        }
    }

    /// Whether `joint` has a quadrature accumulator.
    #[inline]
    pub fn is_tracked(&self, joint: Joint) -> bool {
        self.tracked[joint]
    }

    /// Add an incremental count for `joint` observed at `time`.
    ///
    /// Ignored for joints without a quadrature counter.
    pub fn accumulate(&self, joint: Joint, delta_count: i64, time: Instant) {
        if !self.tracked[joint] {
            trace!("Ignoring count delta for untracked joint {}", joint);
            return;
        }
        lock_slot(&self.slots[joint]).accumulate(delta_count, time);
    }

    /// Convert a 32-bit absolute counter reading for `joint` into a delta.
    ///
    /// The first reading only establishes the reference. The delta is taken
    /// modulo 2³², so a counter rolling over `i32::MAX` yields the short step.
    pub fn record_absolute(&self, joint: Joint, count: i32, time: Instant) {
        if !self.tracked[joint] {
            trace!("Ignoring absolute count for untracked joint {}", joint);
            return;
        }
        let mut slot = lock_slot(&self.slots[joint]);
        if let Some(previous) = slot.last_absolute.replace(count) {
            slot.accumulate(i64::from(count.wrapping_sub(previous)), time);
        }
    }

    /// Average velocity of `joint` since the previous drain; starts a new window at `now`.
    ///
    /// Returns 0 for untracked joints, for empty windows and for windows of
    /// (near) zero length.
    pub fn drain(&self, joint: Joint, now: Instant) -> f64 {
        self.drain_with_odometry(joint, now).0
    }

    /// [`drain`](Self::drain) and [`odometry`](Self::odometry) under one lock hold.
    ///
    /// The distance includes exactly the counts of the drained window.
    pub fn drain_with_odometry(&self, joint: Joint, now: Instant) -> (f64, Option<f64>) {
        if !self.tracked[joint] {
            return (0.0, None);
        }
        let (counts, elapsed, odometry) = {
            let mut slot = lock_slot(&self.slots[joint]);
            let (counts, elapsed) = slot.take_window(now);
            let total = slot.last_sample_time.map(|_| slot.total_count);
            (counts, elapsed, total)
        };
        let velocity = if elapsed < MIN_VELOCITY_WINDOW_S {
            0.0
        } else {
            self.counts_to_units(joint, counts) / elapsed
        };
        (velocity, odometry.map(|total| self.counts_to_units(joint, total)))
    }

    /// Distance travelled by `joint` since startup, `None` before the first count.
    pub fn odometry(&self, joint: Joint) -> Option<f64> {
        if !self.tracked[joint] {
            return None;
        }
        let slot = lock_slot(&self.slots[joint]);
        slot.last_sample_time.is_some().then(|| self.counts_to_units(joint, slot.total_count))
    }

    /// Copy of the accumulator for `joint`.
    pub fn accumulator(&self, joint: Joint) -> VelocityAccumulator {
        *lock_slot(&self.slots[joint])
    }

    /// Joint units per quadrature count for `joint`.
    pub fn units_per_count(&self, joint: Joint) -> f64 {
        self.units_per_revolution[joint] / self.counts_per_revolution
    }

    #[inline]
    fn counts_to_units(&self, joint: Joint, counts: i64) -> f64 {
        counts as f64 * self.units_per_count(joint)
    }
}
