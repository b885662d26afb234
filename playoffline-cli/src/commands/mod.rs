//! CLI command implementations.

pub mod settings;
pub mod simulate;

use std::path::Path;

use playoffline::LibraryConfig;

use crate::error::CliError;

/// Settings file location from the resolved library config.
pub fn settings_path(config: &LibraryConfig) -> Result<&Path, CliError> {
    config
        .settings_path
        .as_deref()
        .ok_or_else(|| CliError::Config("No settings file location".to_string()))
}
