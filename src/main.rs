mod config;
mod nmea;
mod packet;
mod queue;
mod serial_reader;
mod server;
mod time_ref;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use server::NtpServer;

fn main() -> Result<()> {
    init_logging()?;

    info!("GPS NTP server v{}", env!("CARGO_PKG_VERSION"));

    let config_path = get_config_path();
    info!("loading configuration from {}", config_path.display());
    let config = Config::from_file(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;

    info!("configuration:");
    info!("  serial port: {}", config.serial_port);
    info!("  serial baud: {}", config.serial_baud);
    info!("  serial delay: {:.6}s", config.serial_delay);
    info!("  serial error: {:.6}s", config.serial_error);
    info!("  NMEA type: {}", config.nmea_type.prefix());
    info!("  bind address: {}:123", config.ntp_address);
    info!("  poll: {}", config.ntp_poll);

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        shutdown_handler.store(true, std::sync::atomic::Ordering::SeqCst);
    })
    .context("failed to install SIGINT handler")?;

    let server = NtpServer::new(config);

    info!("starting NTP server, press Ctrl+C to stop");
    match server.run(shutdown) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("server error: {:#}", e);
            Err(e)
        }
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to create log filter")?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

fn get_config_path() -> PathBuf {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        return PathBuf::from(&args[1]);
    }
    PathBuf::from(Config::default_path())
}
