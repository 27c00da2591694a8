//! End-to-end bridge scenarios.
//!
//! Drives `BridgeCore` through its public API only: samples go in through
//! `SensorInputs`, commands come out through a recording transport.

use exca_common::config::ConfigLoader;
use exca_common::hal::config::BridgeConfig;
use exca_common::hal::transport::{HalError, Transport};
use exca_common::hal::types::RawCommand;
use exca_common::joint::Joint;
use exca_hal::{BridgeCore, ControlLoop, HoldController, TransportContext, TransportRegistry};
use std::f64::consts::TAU;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const SHIPPED_CONFIG: &str = include_str!("../../config/bridge.toml");

type Sent = Arc<Mutex<Vec<RawCommand>>>;

struct RecordingTransport(Sent);

impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn send(&mut self, command: RawCommand) -> Result<(), HalError> {
        self.0.lock().unwrap().push(command);
        Ok(())
    }
}

fn recording_bridge(config: &BridgeConfig, start: Instant) -> (BridgeCore, Sent) {
    let sent: Sent = Arc::default();
    let log = Arc::clone(&sent);
    let core = BridgeCore::with_start_time(
        config,
        move |_: &TransportContext| Box::new(RecordingTransport(log)) as Box<dyn Transport>,
        start,
    )
    .unwrap();
    (core, sent)
}

fn last_raw(sent: &Sent, joint: Joint) -> f64 {
    sent.lock()
        .unwrap()
        .iter()
        .rev()
        .find(|c| c.joint == joint)
        .map(|c| c.value)
        .unwrap()
}

fn enabled() -> BridgeConfig {
    BridgeConfig {
        start_enabled: true,
        ..BridgeConfig::default()
    }
}

#[test]
fn servo_cylinder_midpoint_reads_as_half_span() {
    let t0 = Instant::now();
    let (mut core, _) = recording_bridge(&BridgeConfig::default(), t0);
    core.inputs().on_position(Joint::Bin, 23552.0, t0);
    core.read_at(t0 + Duration::from_millis(100));
    assert!((core.get_bin_state() - 3.14).abs() < 1e-3);
}

#[test]
fn one_revolution_per_second_of_tread_counts() {
    let t0 = Instant::now();
    let (mut core, _) = recording_bridge(&BridgeConfig::default(), t0);
    let inputs = core.inputs();
    // Ten 100 ms updates of 1280 counts each.
    for i in 1..=10 {
        inputs.on_count_delta(Joint::RightTread, 1280, t0 + Duration::from_millis(100 * i));
    }
    core.read_at(t0 + Duration::from_secs(1));
    assert!((core.state().velocity[Joint::RightTread] - TAU).abs() < 1e-3);

    // Next window is empty.
    core.read_at(t0 + Duration::from_millis(1100));
    assert_eq!(core.state().velocity[Joint::RightTread], 0.0);
}

#[test]
fn disabling_forces_safe_state() {
    let t0 = Instant::now();
    let (mut core, sent) = recording_bridge(&enabled(), t0);
    let inputs = core.inputs();
    inputs.on_position(Joint::Scoop, 2.0, t0);
    core.read_at(t0);
    let scoop_hold = core.state().position[Joint::Scoop];

    core.set_enabled(false);
    let commands = core.commands_mut();
    commands[Joint::LeftTread] = 2.0;
    commands[Joint::RightTread] = -2.0;
    commands[Joint::Scoop] = 1.0;
    core.write_at(t0);

    assert_eq!(last_raw(&sent, Joint::LeftTread), 0.0);
    assert_eq!(last_raw(&sent, Joint::RightTread), 0.0);
    let expected = core.calibration().to_hardware_units(Joint::Scoop, scoop_hold);
    assert!((last_raw(&sent, Joint::Scoop) - expected).abs() < 1e-9);
}

#[test]
fn enabled_bridge_sends_commands() {
    let t0 = Instant::now();
    let (mut core, sent) = recording_bridge(&enabled(), t0);
    core.read_at(t0);
    core.set_command(Joint::Bin, 3.14);
    core.set_command(Joint::LeftTread, TAU / 2.0);
    core.write_at(t0);

    assert!((last_raw(&sent, Joint::Bin) - 23552.0).abs() < 1e-6);
    assert!((last_raw(&sent, Joint::LeftTread) - 500.0).abs() < 1e-9);
}

#[test]
fn runaway_command_saturates() {
    let (mut core, sent) = recording_bridge(&enabled(), Instant::now());
    core.set_command(Joint::Bin, 1e9);
    core.set_command(Joint::Turntable, -1e9);
    core.write();

    let bin = core.calibration().to_hardware_units(Joint::Bin, 6.28);
    assert!((last_raw(&sent, Joint::Bin) - bin).abs() < 1e-6);
    assert!((last_raw(&sent, Joint::Turntable) + 308224.0).abs() < 1e-6);
}

#[test]
fn every_raw_command_stays_in_encoder_span() {
    let (mut core, sent) = recording_bridge(&enabled(), Instant::now());
    for value in [-1e12, -3.0, 0.0, 0.5, 3.0, 1e12, f64::NAN, f64::INFINITY] {
        for joint in Joint::ALL {
            core.set_command(joint, value);
        }
        core.write();
    }
    for command in sent.lock().unwrap().iter() {
        let entry = core.calibration().entry(command.joint);
        let (lo, hi) = if entry.encoder_min < entry.encoder_max {
            (entry.encoder_min, entry.encoder_max)
        } else {
            (entry.encoder_max, entry.encoder_min)
        };
        assert!(command.value.is_finite());
        assert!(lo <= command.value && command.value <= hi, "{:?}", command);
    }
}

#[test]
fn idle_values_before_first_sample() {
    let (mut core, _) = recording_bridge(&BridgeConfig::default(), Instant::now());
    core.read();
    let arm = core.get_arm_state();
    assert_eq!(arm[0], 0.0);
    assert!((arm[1] - 0.104).abs() < 1e-12);
    assert!((arm[2] - 0.98).abs() < 1e-12);
    assert_eq!(arm[3], 0.0);
    assert_eq!(core.get_bin_state(), 0.0);
}

#[test]
fn out_of_range_sensor_reads_as_joint_bound() {
    let t0 = Instant::now();
    let (mut core, _) = recording_bridge(&BridgeConfig::default(), t0);
    let inputs = core.inputs();
    inputs.on_position(Joint::LowerArm, 0.0, t0);
    inputs.on_position(Joint::UpperArm, 9.0, t0);
    core.read_at(t0);

    let arm = core.get_arm_state();
    assert!((arm[1] - 1.55).abs() < 1e-12);
    assert!((arm[2] - 0.98).abs() < 1e-12);
}

#[test]
fn clear_commands_is_immediate() {
    let (mut core, sent) = recording_bridge(&enabled(), Instant::now());
    core.read();
    core.set_command(Joint::LeftTread, 1.0);
    core.write();
    let before = sent.lock().unwrap().len();

    core.clear_commands();
    assert_eq!(sent.lock().unwrap().len(), before + Joint::ALL.len());
    assert_eq!(last_raw(&sent, Joint::LeftTread), 0.0);
}

#[test]
fn zero_turntable_re_anchors_current_reading() {
    let t0 = Instant::now();
    let (mut core, _) = recording_bridge(&BridgeConfig::default(), t0);
    let inputs = core.inputs();
    inputs.on_position(Joint::Turntable, -154112.0, t0);
    core.read_at(t0);
    assert!((core.get_arm_state()[0] + TAU / 2.0).abs() < 1e-9);

    core.zero_turntable().unwrap();
    core.read_at(t0);
    assert!(core.get_arm_state()[0].abs() < 1e-9);

    // A quarter turn further still reads as a quarter turn.
    inputs.on_position(Joint::Turntable, -154112.0 + 77056.0, t0);
    core.read_at(t0);
    assert!((core.get_arm_state()[0] - TAU / 4.0).abs() < 1e-9);
}

#[test]
fn shipped_config_matches_factory_calibration() {
    let config = BridgeConfig::parse(SHIPPED_CONFIG).unwrap();
    config.validate().unwrap();
    let factory = BridgeConfig::default();
    for joint in Joint::ALL {
        assert_eq!(config.joint(joint), factory.joint(joint), "{joint}");
    }
}

#[test]
fn config_file_drives_the_bridge() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bridge.toml");
    fs::write(&path, SHIPPED_CONFIG.replace("start_enabled = false", "start_enabled = true")).unwrap();

    let config = BridgeConfig::load(&path).unwrap();
    assert!(config.start_enabled);
    let core = BridgeCore::from_registry(&config, &TransportRegistry::with_builtin()).unwrap();
    assert!(core.is_enabled());
}

#[test]
fn simulation_loop_holds_still() {
    let config = enabled();
    let joints = config.joint_table().unwrap();
    let core = BridgeCore::from_registry(&config, &TransportRegistry::with_builtin()).unwrap();
    let mut control_loop = ControlLoop::new(core, Box::new(HoldController::new(&joints)), Duration::from_millis(5));

    for _ in 0..5 {
        control_loop.tick();
        std::thread::sleep(Duration::from_millis(30));
    }

    let core = control_loop.core();
    assert!((core.state().position[Joint::UpperArm] - 0.98).abs() < 1e-9);
    assert_eq!(core.state().velocity[Joint::LeftTread], 0.0);
    assert_eq!(control_loop.stats().cycle_count, 5);
}

#[test]
fn simulation_tread_velocity_follows_command() {
    let config = enabled();
    let mut core = BridgeCore::from_registry(&config, &TransportRegistry::with_builtin()).unwrap();

    for _ in 0..6 {
        core.read();
        core.set_command(Joint::LeftTread, TAU);
        core.write();
        std::thread::sleep(Duration::from_millis(60));
    }
    core.read();
    // Publisher phase and sleep jitter skew the window; stay loose.
    let v = core.state().velocity[Joint::LeftTread];
    assert!(v > 0.5 * TAU && v < 1.5 * TAU, "v={v}");
    assert!(core.state().position[Joint::LeftTread] > 0.0);
}
