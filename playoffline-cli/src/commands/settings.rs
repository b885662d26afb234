//! License settings CLI commands.
//!
//! Provides `settings show`, `settings set` and `settings path`.

use std::time::Duration;

use clap::{Subcommand, ValueEnum};
use playoffline::settings::DEFAULT_RENTAL_DURATION;
use playoffline::{IniSettingsStore, LibraryConfig, LicensePolicy, SettingsStore};

use super::settings_path;
use crate::error::CliError;

/// Settings subcommands.
#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Show the license policy applied to new downloads
    Show,

    /// Change the license policy applied to new downloads
    Set {
        /// License type
        #[arg(value_enum)]
        license: LicenseKind,

        /// Rental duration in seconds (rental only, default 3600)
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
    },

    /// Show the settings file path
    Path,
}

/// License type selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum LicenseKind {
    /// Buy the video outright
    Purchase,
    /// Rent the video for a limited time
    Rental,
}

/// Run a settings subcommand.
pub fn run(action: SettingsAction, config: &LibraryConfig) -> Result<(), CliError> {
    match action {
        SettingsAction::Show => run_show(config),
        SettingsAction::Set { license, duration } => run_set(config, license, duration),
        SettingsAction::Path => {
            println!("{}", settings_path(config)?.display());
            Ok(())
        }
    }
}

fn run_show(config: &LibraryConfig) -> Result<(), CliError> {
    let path = settings_path(config)?;
    let store = IniSettingsStore::open(path)?;

    println!("[license]");
    match store.license_policy() {
        LicensePolicy::Purchase => println!("  type = purchase"),
        LicensePolicy::Rental { duration } => {
            println!("  type = rental");
            println!("  rental_duration_secs = {}", duration.as_secs());
        }
    }
    Ok(())
}

fn run_set(
    config: &LibraryConfig,
    license: LicenseKind,
    duration: Option<u64>,
) -> Result<(), CliError> {
    let policy = policy_from_args(license, duration)?;

    let mut store = IniSettingsStore::open_or_default(settings_path(config)?);
    store.set_license_policy(policy)?;

    println!("Set license = {}", policy);
    Ok(())
}

/// Build a policy from CLI arguments.
fn policy_from_args(license: LicenseKind, duration: Option<u64>) -> Result<LicensePolicy, CliError> {
    match (license, duration) {
        (LicenseKind::Purchase, None) => Ok(LicensePolicy::Purchase),
        (LicenseKind::Purchase, Some(_)) => Err(CliError::Config(
            "--duration only applies to rental licenses".to_string(),
        )),
        (LicenseKind::Rental, secs) => {
            let duration = secs.map_or(DEFAULT_RENTAL_DURATION, Duration::from_secs);
            Ok(LicensePolicy::rental(duration)?)
        }
    }
}
