//! CLI error type.

use std::fmt;

use playoffline::logging::LoggingError;
use playoffline::{CoreError, SettingsError};

/// Errors surfaced by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Logging could not be set up.
    Logging(LoggingError),
    /// The settings file could not be read or written.
    Settings(SettingsError),
    /// The download core rejected a scripted command.
    Core(CoreError),
    /// Invalid arguments or missing configuration.
    Config(String),
    /// The simulation did not settle in time.
    Timeout(String),
    /// Results could not be written.
    Output(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Logging(e) => write!(f, "Logging setup failed: {}", e),
            CliError::Settings(e) => write!(f, "Settings error: {}", e),
            CliError::Core(e) => write!(f, "Download error: {}", e),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            CliError::Output(msg) => write!(f, "Output error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Logging(e) => Some(e),
            CliError::Settings(e) => Some(e),
            CliError::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<SettingsError> for CliError {
    fn from(e: SettingsError) -> Self {
        CliError::Settings(e)
    }
}

impl From<CoreError> for CliError {
    fn from(e: CoreError) -> Self {
        CliError::Core(e)
    }
}
