//! Fixed-rate control loop.
//!
//! `ControlLoop` drives a [`BridgeCore`] and a [`JointController`] at
//! `cycle_time_us`:
//!
//! ```text
//! ┌──────────── one tick ─────────────┐
//! read() → controller.update() → write() → sleep(remaining)
//! ```
//!
//! The loop runs until its running flag is cleared (signal handler or
//! another thread), then puts every joint into safe state.

use crate::core::BridgeCore;
use exca_common::hal::config::JointConfig;
use exca_common::hal::types::JointState;
use exca_common::joint::{DriveMode, Joint, JointMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Joint-space controller driven once per tick.
pub trait JointController: Send {
    /// Controller identifier for logs.
    fn name(&self) -> &'static str;

    /// Compute `commands` from the freshly read `state`.
    ///
    /// `dt` is the time since the previous tick's start (zero on the first tick).
    fn update(&mut self, state: &JointState, commands: &mut JointMap<f64>, dt: Duration);
}

/// Keeps the robot still: zero velocity on velocity joints, and position
/// joints held at their first measured position.
///
/// A position joint is latched on the first tick whose state carries a
/// real reading; until then it follows the live `state.position`.
#[derive(Debug, Clone)]
pub struct HoldController {
    drive: JointMap<DriveMode>,
    hold: JointMap<Option<f64>>,
}

impl HoldController {
    /// Create a hold controller for the given joints.
    pub fn new(joints: &JointMap<JointConfig>) -> Self {
        Self {
            drive: JointMap::from_fn(|j| joints[j].drive),
            hold: JointMap::splat(None),
        }
    }

    /// Latched hold position of `joint`, `None` before its first reading.
    pub fn held(&self, joint: Joint) -> Option<f64> {
        self.hold[joint]
    }
}

impl JointController for HoldController {
    fn name(&self) -> &'static str {
        "hold"
    }

    fn update(&mut self, state: &JointState, commands: &mut JointMap<f64>, _dt: Duration) {
        for joint in Joint::ALL {
            commands[joint] = match self.drive[joint] {
                DriveMode::Velocity => 0.0,
                DriveMode::Position => {
                    if self.hold[joint].is_none() && state.reported[joint] {
                        self.hold[joint] = Some(state.position[joint]);
                    }
                    self.hold[joint].unwrap_or(state.position[joint])
                }
            };
        }
    }
}

/// Timing statistics for loop monitoring.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimingStats {
    /// Number of cycles executed
    pub cycle_count: u64,
    /// Number of timing violations (cycle exceeded target)
    pub timing_violations: u64,
    /// Maximum observed cycle time
    pub max_cycle_time_us: u64,
    /// Sum of cycle times for average calculation
    pub total_cycle_time_us: u64,
}

impl TimingStats {
    /// Average cycle time, 0 before the first cycle.
    pub fn avg_cycle_time_us(&self) -> u64 {
        self.total_cycle_time_us.checked_div(self.cycle_count).unwrap_or(0)
    }

    fn record(&mut self, cycle_time_us: u64, target_us: u64) {
        self.cycle_count += 1;
        self.total_cycle_time_us += cycle_time_us;
        self.max_cycle_time_us = self.max_cycle_time_us.max(cycle_time_us);

        if cycle_time_us > target_us {
            self.timing_violations += 1;
            if self.timing_violations <= 10 || self.timing_violations % 1000 == 0 {
                warn!(
                    "Timing violation #{}: cycle took {}us (target {}us)",
                    self.timing_violations, cycle_time_us, target_us
                );
            }
        }
    }
}

/// Fixed-rate runner around a bridge and a controller.
pub struct ControlLoop {
    core: BridgeCore,
    controller: Box<dyn JointController>,
    /// Running flag for loop control
    running: Arc<AtomicBool>,
    cycle_time: Duration,
    stats: TimingStats,
    last_tick: Option<Instant>,
}

impl ControlLoop {
    /// Create a loop ticking every `cycle_time`.
    pub fn new(core: BridgeCore, controller: Box<dyn JointController>, cycle_time: Duration) -> Self {
        Self {
            core,
            controller,
            running: Arc::new(AtomicBool::new(true)),
            cycle_time,
            stats: TimingStats::default(),
            last_tick: None,
        }
    }

    /// Execute one read → update → write tick.
    pub fn tick(&mut self) {
        let start = Instant::now();
        let dt = self
            .last_tick
            .map_or(Duration::ZERO, |prev| start.saturating_duration_since(prev));
        self.last_tick = Some(start);

        self.core.read_at(start);
        let state = *self.core.state();
        self.controller.update(&state, self.core.commands_mut(), dt);
        self.core.write();

        let target_us = self.cycle_time.as_micros() as u64;
        self.stats.record(start.elapsed().as_micros() as u64, target_us);
    }

    /// Run until the running flag is cleared.
    ///
    /// Blocks the calling thread. Commands are cleared to safe state on exit.
    pub fn run(&mut self) {
        info!(
            "Starting control loop (controller={}, cycle_time={}us)...",
            self.controller.name(),
            self.cycle_time.as_micros()
        );
        if detect_rt_mode() {
            info!("Running in real-time mode");
        } else {
            info!("Running in standard (non-RT) mode");
        }

        while self.running.load(Ordering::SeqCst) {
            let cycle_start = Instant::now();
            self.tick();

            // Debug log every 1000 cycles
            if self.stats.cycle_count % 1000 == 0 {
                debug!(
                    "Control loop: {} cycles, avg={}us, max={}us, violations={}",
                    self.stats.cycle_count,
                    self.stats.avg_cycle_time_us(),
                    self.stats.max_cycle_time_us,
                    self.stats.timing_violations
                );
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < self.cycle_time {
                std::thread::sleep(self.cycle_time - elapsed);
            }
        }

        self.core.clear_commands();
        info!(
            "Control loop stopped after {} cycles (violations: {})",
            self.stats.cycle_count, self.stats.timing_violations
        );
    }

    /// Get the running flag for signal handlers.
    ///
    /// The flag starts set; clearing it before `run()` makes `run()` return
    /// after clearing commands.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Get timing statistics.
    pub fn stats(&self) -> TimingStats {
        self.stats
    }

    /// The bridge driven by this loop.
    pub fn core(&self) -> &BridgeCore {
        &self.core
    }

    /// Mutable access to the bridge (enable, rezero, ...).
    pub fn core_mut(&mut self) -> &mut BridgeCore {
        &mut self.core
    }

    /// Stop owning the bridge.
    pub fn into_core(self) -> BridgeCore {
        self.core
    }
}

/// Detect if running in real-time mode by checking scheduler policy.
pub fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        // SAFETY: sched_getscheduler(0) only queries the calling thread's policy.
        let policy = unsafe { sched_getscheduler(0) };
        policy == SCHED_FIFO || policy == SCHED_RR
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
