//! # SL Control Unit
//!
//! Orchestration host for the slide/tray loader. Connects a session over
//! the chosen channel (the simulated loader in this build), polls status
//! on the configured cadence and runs a soak session until the requested
//! number of cycles completes.
//!
//! Calibration wizards are driven programmatically through the session's
//! effect runner; this binary exercises the soak path, which is the
//! long-running unattended workload.

use clap::Parser;
use sl_common::config::{ConfigError, ConfigLoader, LoaderConfig};
use sl_control_unit::session::LoaderSession;
use sl_control_unit::soak::{NoopHooks, SoakPhase, SoakScheduler};
use sl_sim::SimLoader;
use std::path::PathBuf;
use std::process;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Safety valve for scan-only runs, which have no natural cycle bound.
const MAX_TICKS: u64 = 100_000;

/// SL Control Unit — slide/tray loader orchestration host
#[derive(Parser, Debug)]
#[command(name = "sl_control_unit")]
#[command(version)]
#[command(about = "Orchestration host for the slide/tray loader")]
struct Args {
    /// Path to the loader configuration TOML.
    #[arg(default_value = "config/loader.toml")]
    config: PathBuf,

    /// Controller COM port.
    #[arg(long, default_value_t = 1)]
    port: u16,

    /// Soak cycles to complete before exiting.
    #[arg(long, default_value_t = 3)]
    cycles: u64,

    /// Alternate hotel scans instead of cycling trays.
    #[arg(long)]
    scan_only: bool,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("SL Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("SL Control Unit shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match LoaderConfig::load(&args.config) {
        Ok(config) => config,
        Err(ConfigError::FileNotFound) => {
            warn!(
                "Config '{}' not found, using defaults",
                args.config.display()
            );
            LoaderConfig::default()
        }
        Err(e) => return Err(Box::new(e)),
    };
    config.validate()?;
    info!(
        "Config OK: service={}, poll_interval={}ms",
        config.shared.service_name, config.timing.poll_interval_ms
    );

    let mut session = LoaderSession::new(SimLoader::new(), &config);
    session.connect(args.port)?;
    info!("Controller: {}", session.controller_info()?);

    let mut soak_options = config.soak.clone();
    soak_options.scan_only |= args.scan_only;
    let mut soak = SoakScheduler::new(soak_options);
    let mut hooks = NoopHooks;
    soak.start();

    let mut ticks = 0u64;
    while soak.cycles_completed() < args.cycles {
        session.poll();
        if let Err(e) = session.soak_tick(&mut soak, &mut hooks) {
            error!("soak aborted: {e}");
            break;
        }
        if soak.phase() == SoakPhase::Idle {
            info!("soak ended before the cycle target");
            break;
        }
        ticks += 1;
        if ticks >= MAX_TICKS {
            warn!("tick limit reached, stopping soak");
            break;
        }
        std::thread::sleep(config.timing.poll_interval());
    }
    soak.stop();
    info!("Soak finished: {} cycles", soak.cycles_completed());

    session.disconnect()?;
    Ok(())
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
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
