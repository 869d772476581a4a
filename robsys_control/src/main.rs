//! # Robot System Control Core
//!
//! Loads `system.toml` from the configuration directory, opens the events,
//! axes and joints channels, loads the named robot and enters the cycle
//! loop until interrupted.

use clap::Parser;
use robsys_common::config::{LogLevel, SystemConfig};
use robsys_control::cycle::{Channels, CycleRunner, rt_setup};
use robsys_control::datalog::TracingDataLog;
use robsys_control::error::SystemError;
use robsys_control::fault::install_fatal_fault_handler;
use robsys_control::registry::RobotRegistry;
use robsys_control::session::Session;
use robsys_control::transport::{self, Channel, ChannelRole};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Robot control core: cyclic events/axes/joints server
#[derive(Parser, Debug)]
#[command(name = "robsys_control")]
#[command(version)]
#[command(about = "Cyclic robot control core serving events, axes and joints channels")]
struct Args {
    /// Configuration directory (system.toml + robots/<name>.toml).
    #[arg(long, value_name = "DIR", default_value = "./config/")]
    config: PathBuf,

    /// Address to bind the channels to (default: all interfaces).
    #[arg(long, value_name = "ADDRESS")]
    addr: Option<String>,

    /// Robot configuration name to load at startup.
    robot_name: String,

    /// CPU core to pin the cycle thread to (rt feature only).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (rt feature only).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = SystemConfig::load_dir(&args.config);
    let log_level = config
        .as_ref()
        .map_or(LogLevel::default(), |c| c.shared.log_level);
    setup_tracing(&args, log_level);

    info!("robsys_control v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config
        .map_err(SystemError::from)
        .and_then(|config| run(&args, &config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("robsys_control shutdown complete");
}

fn run(args: &Args, config: &SystemConfig) -> Result<(), SystemError> {
    info!(
        "Config OK: service={}, cycle_time={}ms, ports events={} axes={} joints={}",
        config.shared.service_name,
        config.cycle_time_ms,
        config.events_port,
        config.axes_port,
        config.joints_port
    );

    let addr = args.addr.as_deref();
    let channels = Channels {
        events: open_channel("events", ChannelRole::Reliable, addr, config.events_port)?,
        axes: open_channel("axes", ChannelRole::Datagram, addr, config.axes_port)?,
        joints: open_channel("joints", ChannelRole::Datagram, addr, config.joints_port)?,
    };

    let registry = RobotRegistry::with_builtin_robots(&args.config);
    info!(
        "Robot kinds {:?}, configurations under {}",
        registry.list_kinds(),
        registry.config_dir().join("robots").display()
    );
    let mut session = Session::new(Box::new(registry));
    if session.refresh(Some(&args.robot_name)).is_none() {
        warn!(
            "Robot '{}' not loaded, control opcodes will fail until a hot-swap succeeds",
            args.robot_name
        );
    }

    install_fatal_fault_handler()?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| SystemError::Signal(e.to_string()))?;

    rt_setup(args.cpu_core, args.rt_priority)?;

    let mut runner = CycleRunner::new(
        session,
        channels,
        Box::new(TracingDataLog::new(config.log_root.clone())),
        config.cycle_time(),
        running,
    );
    let result = runner.run();
    runner.shutdown();
    result
}

fn open_channel(
    name: &'static str,
    role: ChannelRole,
    addr: Option<&str>,
    port: u16,
) -> Result<Box<dyn Channel>, SystemError> {
    transport::open(role, addr, port).map_err(|source| SystemError::Channel {
        channel: name,
        source,
    })
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        match log_level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
