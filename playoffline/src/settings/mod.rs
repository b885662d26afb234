//! License-policy settings.
//!
//! The settings view lets the user choose whether offline copies are bought
//! outright or rented for a limited time. The download core only reads the
//! policy, once per download request, and snapshots it on the download.
//!
//! Two stores are provided:
//! - [`MemorySettings`] keeps the policy in process
//! - [`IniSettingsStore`] persists it to an INI file

mod ini_store;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use ini_store::IniSettingsStore;

/// Rental duration used when nothing is configured.
pub const DEFAULT_RENTAL_DURATION: Duration = Duration::from_secs(3600);

/// Offline playback rights requested with a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LicensePolicy {
    /// Permanent offline rights.
    Purchase,
    /// Time-limited offline rights.
    Rental { duration: Duration },
}

impl Default for LicensePolicy {
    fn default() -> Self {
        LicensePolicy::Rental {
            duration: DEFAULT_RENTAL_DURATION,
        }
    }
}

impl LicensePolicy {
    /// Create a rental policy.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::ZeroRentalDuration`] for a zero duration.
    pub fn rental(duration: Duration) -> Result<Self, SettingsError> {
        if duration.is_zero() {
            return Err(SettingsError::ZeroRentalDuration);
        }
        Ok(LicensePolicy::Rental { duration })
    }

    /// Whether this is a purchase.
    pub fn is_purchase(&self) -> bool {
        matches!(self, LicensePolicy::Purchase)
    }

    /// Rental duration, if this is a rental.
    pub fn rental_duration(&self) -> Option<Duration> {
        match self {
            LicensePolicy::Purchase => None,
            LicensePolicy::Rental { duration } => Some(*duration),
        }
    }
}

impl fmt::Display for LicensePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicensePolicy::Purchase => f.write_str("purchase"),
            LicensePolicy::Rental { duration } => write!(f, "rental ({}s)", duration.as_secs()),
        }
    }
}

/// Errors from reading or writing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Reading or writing the settings file failed.
    #[error("settings I/O error at {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    /// The settings file is not valid INI.
    #[error("failed to parse settings file {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    /// A key holds a value outside its domain.
    #[error("invalid value '{value}' for setting '{key}'")]
    InvalidValue { key: String, value: String },

    /// Rentals must last longer than zero seconds.
    #[error("rental duration must be greater than zero")]
    ZeroRentalDuration,
}

/// Read/write access to the persisted license policy.
pub trait SettingsStore {
    /// Current license policy.
    fn license_policy(&self) -> LicensePolicy;

    /// Replace the license policy.
    fn set_license_policy(&mut self, policy: LicensePolicy) -> Result<(), SettingsError>;
}

/// In-process settings.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    policy: LicensePolicy,
}

impl MemorySettings {
    /// Create settings holding `policy`.
    pub fn new(policy: LicensePolicy) -> Self {
        Self { policy }
    }
}

impl SettingsStore for MemorySettings {
    fn license_policy(&self) -> LicensePolicy {
        self.policy
    }

    fn set_license_policy(&mut self, policy: LicensePolicy) -> Result<(), SettingsError> {
        if policy.rental_duration().is_some_and(|d| d.is_zero()) {
            return Err(SettingsError::ZeroRentalDuration);
        }
        self.policy = policy;
        Ok(())
    }
}
