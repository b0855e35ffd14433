//! # Servo Bridge
//!
//! Interactive console for a servo bridge on a serial port.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Parse command line and load configuration
//!    - Set up logging with tracing subscriber (optionally to a rolling file)
//!    - Open the serial link and subscribe to telemetry
//!
//! 2. **Main Loop**
//!    - Read commands from stdin and run them against the link
//!    - Print every telemetry sample as a JSON line
//!    - Handle Ctrl+C for graceful shutdown
//!
//! 3. **Graceful Shutdown**
//!    - Close the link (fails pending requests, stops the reader)
//!
//! Expected output:
//! ```text
//! INFO servo_bridge: Servo Bridge v0.1.0 starting...
//! INFO servo_bridge::serial: Opened serial port /dev/ttyUSB0 at 115200 baud
//! INFO servo_bridge::link: Link open
//! > so 1 512
//! ch1: sent
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use servo_bridge::config::Config;
use servo_bridge::link::ServoLink;
use servo_bridge::protocol::wire::TelemetrySample;
use servo_bridge::repl::{self, Flow};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "servo-bridge", version, about = "Drive servos through a serial radio bridge")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, overrides the configuration
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate, overrides the configuration
    #[arg(short, long)]
    baud: Option<u32>,

    /// Extra trace tags to enable (e.g. serial, write, telemetry, all)
    #[arg(short, long = "debug")]
    debug: Vec<String>,
}

/// Telemetry sample as printed on stdout
#[derive(Debug, Serialize)]
struct TelemetryRecord {
    timestamp: String,
    #[serde(flatten)]
    sample: TelemetrySample,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.serial.port = port;
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    config.debug.tags.extend(args.debug);
    config.validate().context("invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&config);

    info!("Servo Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let link = ServoLink::from_config(&config);
    link.on_telemetry(print_telemetry);
    link.open_serial(&config.serial.port, config.serial.baud_rate)
        .await
        .with_context(|| format!("failed to open {}", config.serial.port))?;

    info!("Type 'help' for commands, Ctrl+C to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match repl::handle_line(&link, &line).await {
                    Flow::Continue(Some(message)) => println!("{}", message),
                    Flow::Continue(None) => {}
                    Flow::Exit => break,
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    if let Err(e) = link.close().await {
        warn!("Error while closing link: {}", e);
    }

    Ok(())
}

/// Initialize tracing: stderr always, plus a daily file when configured
fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let stderr = fmt::layer().with_writer(std::io::stderr);

    match &config.logging.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "servo-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

fn print_telemetry(sample: TelemetrySample) {
    let record = TelemetryRecord {
        timestamp: chrono::Local::now().to_rfc3339(),
        sample,
    };
    match serde_json::to_string(&record) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to serialize telemetry: {}", e),
    }
}
