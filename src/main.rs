//! RawHID Listener
//!
//! Reads commands from stdin, polls the open device on a second thread and
//! prints device text, hex dumps and status lines to stdout.

use std::io::{self, BufReader};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use rawhid_listener::cli::Cli;
use rawhid_listener::{Console, Listener, ListenerConfig, Session};
use rawhid_transport::HidApiTransport;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the operator and front-end scripts
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config_path();
    info!("Loading config from {:?}", config_path);
    let mut config = ListenerConfig::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    cli.apply(&mut config);
    debug!("Effective config: {:?}", config);

    let mut transport = HidApiTransport::new().context("Failed to initialize HID API")?;

    if cli.list {
        return list_devices(&mut transport);
    }

    let mut console = Console::stdout();
    console.line("'RawHID Listener");

    let listener = Listener::new(Session::new(Box::new(transport), config, console));

    let quit = listener.quit_handle();
    ctrlc::set_handler(move || {
        quit.shutdown();
        std::process::exit(0);
    })
    .context("Failed to install Ctrl-C handler")?;

    listener
        .run(BufReader::new(io::stdin()))
        .context("Listener failed")
}

fn list_devices(transport: &mut HidApiTransport) -> Result<()> {
    let devices = transport
        .device_summaries()
        .context("Failed to enumerate HID devices")?;

    for dev in &devices {
        println!(
            "{:04X}:{:04X} usage {:04X}:{:04X} if {} {}",
            dev.vendor_id,
            dev.product_id,
            dev.usage_page,
            dev.usage,
            dev.interface_number,
            dev.product.as_deref().unwrap_or("(unnamed)")
        );
        println!("    {}", dev.path);
    }
    println!("Found {} HID devices", devices.len());
    Ok(())
}
