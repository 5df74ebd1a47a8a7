//! subterm host process
//!
//! Launched by a controller in its own console with a single encoded
//! [`LaunchConfig`] argument. Draws the remote terminal and serves the
//! controller's requests until the terminal ends.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use st_core::config::{self, LaunchConfig};
use st_host::{CrosstermSurface, Host};

#[derive(Parser)]
#[command(name = "subterm-host")]
#[command(about = "subterm host - owns a remote terminal window")]
#[command(version)]
struct Args {
    /// Encoded launch configuration supplied by the controller
    launch: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log file (the console is used for drawing)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let launch = LaunchConfig::decode(&args.launch).context("Invalid launch argument")?;
    let surface = CrosstermSurface::new().context("Failed to prepare console")?;
    let host = Host::connect(launch, Box::new(surface)).context("Failed to connect to controller")?;

    let interrupt = host.interrupt_handle();
    ctrlc::set_handler(move || interrupt.interrupt()).context("Failed to install signal handler")?;

    let code = serve(host);
    std::process::exit(code);
}

/// Run a connected host to completion and pick the process exit code
fn serve(mut host: Host) -> i32 {
    if let Err(e) = host.await_start() {
        tracing::error!(error = %e, "host not started");
        return e.exit_code();
    }

    let code = match host.run() {
        Ok(code) => i32::try_from(code).unwrap_or(i32::MAX),
        Err(e) => {
            tracing::error!(error = %e, "host failed");
            e.exit_code()
        }
    };

    // Restore the console before exiting
    drop(host);
    code
}

fn init_logging(args: &Args) -> Result<()> {
    let path = args.log_file.clone().unwrap_or_else(config::default_log_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log dir {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();

    Ok(())
}
