//! clibd - Clib Daemon
//!
//! Bridges a Buttplug-style WebSocket client to a Clib actuator on a serial
//! port.
//!
//! # Usage
//!
//! Pick a port interactively:
//! ```bash
//! clibd
//! ```
//!
//! With a config file and a fixed port, blending enabled:
//! ```bash
//! clibd --config clibd.toml --port /dev/ttyACM0 --blend
//! ```
//!
//! Without hardware:
//! ```bash
//! clibd --mock
//! ```

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use clib_core::PowerSink;
use clib_serial::transport::{list_ports, suggest_port};
use clib_serial::{create_transport, DeviceController, PowerBlender};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod prompt;

use app::{App, StopReason};
use config::{DaemonConfig, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "clibd")]
#[command(about = "Serve a Clib actuator over the Buttplug WebSocket protocol")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long, env = "CLIBD_CONFIG")]
    config: Option<String>,

    /// Serial port to open; skips the interactive prompt
    #[arg(short, long)]
    port: Option<String>,

    /// WebSocket listen port
    #[arg(short, long)]
    listen_port: Option<u16>,

    /// Wrap the device in the power blender
    #[arg(long)]
    blend: bool,

    /// Use the in-memory transport instead of a serial port
    #[arg(long)]
    mock: bool,

    /// Accept the suggested serial port without prompting
    #[arg(short, long)]
    yes: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Command-line flags take precedence over the file
    fn apply(&self, config: &mut DaemonConfig) {
        if let Some(port) = &self.port {
            config.serial.path = Some(port.clone());
        }
        if let Some(listen_port) = self.listen_port {
            config.server.port = listen_port;
        }
        if self.blend {
            config.blender.enabled = true;
        }
        if self.mock {
            config.serial.mock = true;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    args.apply(&mut config);

    init_tracing(args.verbose, config.logging.format);
    info!("Starting clibd");
    if let Some(path) = &args.config {
        info!("Loaded config from: {}", path);
    }

    let path = select_port(&config, args.yes).await?;
    let transport = create_transport(&config.serial.transport_config(&path));
    let controller = Arc::new(DeviceController::new(
        transport,
        config.serial.controller_config(),
    ));

    let sink: Arc<dyn PowerSink> = if config.blender.enabled {
        info!(
            ticks_per_second = config.blender.ticks_per_second,
            roughness = config.blender.roughness,
            range = config.blender.range,
            "Power blending enabled"
        );
        Arc::new(PowerBlender::new(controller, &config.blender.blender_config()))
    } else {
        controller
    };

    sink.open()
        .await
        .with_context(|| format!("Failed to open {}", path))?;

    let addr = config.server.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let mut app = App::start(sink, config.server.protocol_options(), listener)?;
    info!("Ready - press Ctrl+C to stop");

    let reason = app.run().await;
    app.shutdown().await;

    match reason {
        StopReason::Signal(signal) => {
            info!(signal, "Stopped");
            Ok(())
        }
        StopReason::ServerExited => bail!("Server exited unexpectedly"),
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_filter = if verbose {
        "clibd=debug,clib_api=debug,clib_serial=debug"
    } else {
        "clibd=info,clib_api=info,clib_serial=debug"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Resolve the serial port from flags, config, or the user
async fn select_port(config: &DaemonConfig, accept_suggestion: bool) -> Result<String> {
    if config.serial.mock {
        info!("Using mock transport");
        return Ok("mock".to_string());
    }
    if let Some(path) = &config.serial.path {
        return Ok(path.clone());
    }

    let ports = list_ports().context("Failed to list serial ports")?;
    let suggested = suggest_port(&ports, &config.serial.port_hint).cloned();
    match &suggested {
        Some(port) => info!(port = %port.label(), "Suggested serial port"),
        None => warn!(hint = %config.serial.port_hint, "No serial port matches the hint"),
    }

    if accept_suggestion {
        if let Some(port) = suggested {
            return Ok(port.path);
        }
        bail!("--yes given but no port matches {:?}", config.serial.port_hint);
    }

    tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        prompt::choose_port(&ports, suggested.as_ref(), stdin.lock(), std::io::stderr())
    })
    .await
    .context("Port prompt failed")?
}
