//! DSP Control Console
//!
//! Drives one audio DSP over a serial port or TCP socket from the terminal.
//! The device configuration is read from the JSON file given on the command
//! line, or from `$XDG_CONFIG_HOME/dspctl/config.json`.

mod connection;
mod console;
mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dsp_engine::{link, spawn_engine, DspConfig};
use serialport::SerialPortType;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Operator console for an audio DSP on a serial or TCP control link
#[derive(Debug, Parser)]
#[command(name = "dspctl", version, about)]
struct Args {
    /// Device configuration file (default: $XDG_CONFIG_HOME/dspctl/config.json)
    config: Option<PathBuf>,

    /// Run against a simulated rack instead of the configured link
    #[arg(long)]
    simulate: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn list_ports() -> Result<()> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.port_type {
            SerialPortType::UsbPort(usb) => println!(
                "{}  USB {:04x}:{:04x} {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "dspctl=info,dsp_protocol=info,dsp_engine=info,dsp_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    if args.list_ports {
        return list_ports();
    }

    let path = settings::resolve_config_path(args.config)?;
    let config = DspConfig::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    tracing::info!("Starting dspctl for {}", config.key);

    let engine = config.build_engine()?;
    let (engine_end, transport_end) = link();
    let (handle, engine_task) = spawn_engine(engine, engine_end);

    let transport_task = match (&config.control, args.simulate) {
        (Some(control), false) => {
            tokio::spawn(connection::run_reconnecting(control.clone(), transport_end))
        }
        (None, false) => {
            tracing::warn!("No control link configured, using the simulator");
            tokio::spawn(connection::run_simulated(config.clone(), transport_end))
        }
        (_, true) => tokio::spawn(connection::run_simulated(config.clone(), transport_end)),
    };

    // First poll now rather than one interval after start
    handle.poll()?;

    let result = console::run(handle.clone()).await;

    // The engine may already be gone if that is why the console stopped
    let _ = handle.shutdown();
    drop(handle);
    engine_task.await.context("Engine task failed")?;
    transport_task.await.context("Transport task failed")?;

    tracing::info!("dspctl stopped");
    result
}
