//! PlayOffline CLI - Command-line interface
//!
//! Drives the download core against the simulated engine and manages the
//! license settings file.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use playoffline::logging::{init_logging, LoggingConfig};
use playoffline::LibraryConfig;

use commands::settings::SettingsAction;
use commands::simulate::SimulateArgs;
use error::CliError;

/// Offline video download tracking.
#[derive(Debug, Parser)]
#[command(name = "playoffline", version, about)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. info, playoffline=debug)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Also write daily-rotated log files to this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Settings file [default: <config dir>/playoffline/settings.ini]
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run downloads against the simulated engine
    Simulate(SimulateArgs),

    /// View or change the license policy
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", console::style("error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut logging = LoggingConfig::default().with_level(cli.log_level);
    if let Some(dir) = cli.log_dir {
        logging = logging.with_log_dir(dir);
    }
    let _guard = init_logging(&logging)?;

    let config = library_config(cli.settings)?;
    tracing::debug!(settings = ?config.settings_path, "CLI starting");

    match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args, &config),
        Commands::Settings { action } => commands::settings::run(action, &config),
    }
}

/// Library configuration with the settings path resolved.
fn library_config(settings: Option<PathBuf>) -> Result<LibraryConfig, CliError> {
    let config = match settings {
        Some(path) => LibraryConfig::default().with_settings_path(path),
        None => LibraryConfig::default(),
    };
    if config.settings_path.is_none() {
        return Err(CliError::Config(
            "No user config directory found. Pass --settings <FILE>.".to_string(),
        ));
    }
    Ok(config)
}
