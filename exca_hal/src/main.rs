//! # EXCA HAL Bridge Binary
//!
//! Runs the hardware bridge with a hold controller until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Loopback simulation, commands enabled
//! exca_hal --config config/bridge.toml --simulate --enable
//!
//! # Named transport, verbose JSON logs
//! exca_hal --config config/bridge.toml --transport canopen -v --json
//! ```

use clap::Parser;
use exca_common::config::{ConfigError, ConfigLoader};
use exca_common::consts::DEFAULT_CONFIG_PATH;
use exca_common::hal::config::BridgeConfig;
use exca_hal::drivers::simulation;
use exca_hal::{BridgeCore, ControlLoop, HoldController, TransportRegistry};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// EXCA HAL - hardware bridge for the excavation robot
#[derive(Parser, Debug)]
#[command(name = "exca_hal")]
#[command(version)]
#[command(about = "Hardware bridge between actuator channels and a fixed-rate joint controller")]
#[command(long_about = None)]
struct Args {
    /// Path to bridge configuration file (bridge.toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Transport to use (overrides the configuration)
    #[arg(short, long)]
    transport: Option<String>,

    /// Force the simulation transport
    #[arg(short = 's', long)]
    simulate: bool,

    /// Dispatch commands from the start instead of safe-state
    #[arg(short, long)]
    enable: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("Bridge startup failed: {}", e);
        eprintln!("exca_hal: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let (mut config, defaulted) = load_config(&args.config)?;

    setup_tracing(&args, config.shared.log_level.into());
    info!("EXCA HAL v{} starting...", env!("CARGO_PKG_VERSION"));
    if defaulted {
        warn!("No configuration at {:?}, using factory calibration", args.config);
    }

    if args.simulate {
        info!("Simulation mode enabled (exclusive)");
        config.transport = simulation::TRANSPORT_NAME.to_string();
    } else if let Some(ref transport) = args.transport {
        config.transport = transport.clone();
    }
    if args.enable {
        config.start_enabled = true;
    }

    let registry = TransportRegistry::with_builtin();
    let core = BridgeCore::from_registry(&config, &registry)?;
    let controller = HoldController::new(&config.joint_table()?);
    let cycle_time = Duration::from_micros(u64::from(config.cycle_time_us));
    let mut control_loop = ControlLoop::new(core, Box::new(controller), cycle_time);

    let running = control_loop.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    control_loop.run();

    control_loop.core_mut().shutdown()?;
    info!("EXCA HAL shutdown complete");
    Ok(())
}

/// Load and validate the configuration; fall back to the factory default
/// when the default path does not exist.
fn load_config(path: &Path) -> Result<(BridgeConfig, bool), Box<dyn std::error::Error>> {
    let (config, defaulted) = match BridgeConfig::load(path) {
        Ok(config) => (config, false),
        Err(ConfigError::FileNotFound) if path == Path::new(DEFAULT_CONFIG_PATH) => {
            (BridgeConfig::default(), true)
        }
        Err(e) => return Err(format!("{}: {}", path.display(), e).into()),
    };
    config.validate()?;
    Ok((config, defaulted))
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: Level) {
    let level = if args.verbose { Level::DEBUG } else { configured };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
