// src/main.rs
//! nmea-fusion - read NMEA ports and print the fused fix as JSON lines

use anyhow::{Context, Result};
use clap::Parser;
use nmea_fusion::{
    config::AcquisitionConfig,
    gps::port::list_serial_ports,
    logging, FixManager, FixObserver, NavigationFix, NmeaPort, StaleCallback,
};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};

/// One line of output: the fused fix plus readable fix and mode names
#[derive(Serialize)]
struct FixLine<'a> {
    #[serde(flatten)]
    fix: &'a NavigationFix,
    fix_description: String,
    mode_description: String,
    speed_kmh: Option<f64>,
}

impl<'a> FixLine<'a> {
    fn new(fix: &'a NavigationFix) -> Self {
        Self {
            fix,
            fix_description: fix.get_fix_description(),
            mode_description: fix.get_mode_description(),
            speed_kmh: fix.speed_kmh(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "nmea-fusion", version, about = "Fuse NMEA GPS and compass ports into one fix")]
struct Args {
    /// Configuration file (defaults to ~/.config/nmea-fusion/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port to read, may be repeated
    #[arg(short, long = "port")]
    ports: Vec<String>,

    /// Baud rate for ports given on the command line
    #[arg(short, long, default_value_t = 4800)]
    baud: u32,

    /// Flag the fix as stale after this many seconds without data
    #[arg(short, long)]
    watchdog: Option<f64>,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.verbose).context("failed to initialise logging")?;

    if args.list_ports {
        let ports = list_serial_ports()?;
        if ports.is_empty() {
            println!("No serial ports found.");
        } else {
            println!("Available serial ports:");
            for (name, kind) in ports {
                println!("  {} - {}", name, kind);
            }
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => AcquisitionConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AcquisitionConfig::load().context("failed to load config")?,
    };
    for port in &args.ports {
        config.add_port(port.clone(), args.baud);
    }
    if args.watchdog.is_some() {
        config.watchdog_secs = args.watchdog;
    }
    config.validate()?;

    if config.ports.is_empty() {
        anyhow::bail!("no ports configured, pass --port or add them to the config file");
    }

    let manager = FixManager::with_settings(config.reader_settings());
    for port in &config.ports {
        let mut opened = NmeaPort::open_serial(&port.path, port.baudrate)
            .with_context(|| format!("failed to open {}", port.path))?;
        if let Some(timeout) = config.read_timeout() {
            opened = opened.with_read_timeout(timeout);
        }
        manager.add_port(Arc::new(opened));
    }

    let printer: Arc<dyn FixObserver> = Arc::new(|fix: &NavigationFix| match serde_json::to_string(&FixLine::new(fix)) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!(error = %e, "Failed to serialise fix"),
    });
    manager.register_observer(printer);

    let on_stale: StaleCallback = Arc::new(|| warn!("No NMEA data received within the watchdog interval"));
    manager.register_watchdog_callback(on_stale);

    if let Some(interval) = config.watchdog_interval() {
        manager.enable_watchdog(interval)?;
    }
    manager.start()?;

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("Shutting down");

    if manager.has_watchdog() {
        manager.disable_watchdog()?;
    }
    manager.stop().await;
    Ok(())
}
