//! subterm CLI
//!
//! Opens remote terminal windows driven from this process and manages the
//! configuration shared with `subterm-host`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subterm::commands::{self, OpenOptions};
use subterm::output::print_error;

#[derive(Parser)]
#[command(name = "subterm")]
#[command(author, version, about = "Remote terminal windows driven over pipes")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a remote window with a message and a button
    Open {
        /// Text written at the top of the window
        #[arg(short, long, default_value = "Hello from subterm")]
        text: String,
        /// Button label
        #[arg(short, long, default_value = "OK")]
        button: String,
        /// Seconds to wait for a click
        #[arg(long, default_value_t = 30)]
        timeout: u64,
        /// Click the button from this side after N ticks
        #[arg(long)]
        click_after: Option<u64>,
        /// Ticks per second (overrides config)
        #[arg(long)]
        tps: Option<u32>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let result = match cli.command {
        Commands::Open {
            text,
            button,
            timeout,
            click_after,
            tps,
        } => {
            let mut config = commands::load(cli.config.as_ref())?.window;
            if let Some(tps) = tps {
                config.tps = tps;
            }
            let options = OpenOptions {
                text,
                button,
                timeout: Duration::from_secs(timeout),
                click_after,
            };
            commands::open_command(config, options)
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(cli.config.as_ref()),
            ConfigAction::Init { force } => commands::config_init(cli.config.as_ref(), force),
            ConfigAction::Path => commands::config_path(cli.config.as_ref()),
        },
    };

    if let Err(e) = result {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
