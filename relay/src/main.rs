//! Ground-station relay server binary.
//!
//! Opens the configured serial devices, loads the whitelist, and serves
//! authenticated TCP clients until interrupted.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay::channel::DEFAULT_DELIMITERS;
use relay::transport::DEFAULT_BAUD;
use relay::{RelayConfig, RelayServer};

/// Default TCP port for the relay service.
const DEFAULT_PORT: u16 = 2809;

/// Default whitelist file, relative to the working directory.
const DEFAULT_WHITELIST: &str = "whitelist.txt";

/// Default serial devices when none are given on the command line.
const DEFAULT_DEVICES: [&str; 2] = ["/dev/ttyUSB0", "/dev/ttyUSB1"];

/// Serial relay server for the ground station
#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "Shares the station's serial devices over TCP")]
#[command(version)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Whitelist CSV file (one username,password pair per line)
    #[arg(short, long, default_value = DEFAULT_WHITELIST)]
    whitelist: PathBuf,

    /// Root directory for the Data-Logs tree
    #[arg(long, default_value = ".")]
    log_root: PathBuf,

    /// Baud rate for every serial device
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Serial device names; order assigns the port digits 0, 1, ...
    devices: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let devices = if args.devices.is_empty() {
        DEFAULT_DEVICES.iter().map(|d| d.to_string()).collect()
    } else {
        args.devices
    };
    info!(?devices, port = args.port, "starting relay server");

    let config = RelayConfig {
        port: args.port,
        devices,
        baud: args.baud,
        whitelist: args.whitelist,
        log_root: args.log_root,
        delimiters: DEFAULT_DELIMITERS.to_vec(),
    };

    let server = RelayServer::start(config)
        .await
        .context("relay server startup failed")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for ctrl-c")?;
    info!("interrupt received, shutting down");
    server.shutdown();
    Ok(())
}
