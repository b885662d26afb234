//! Configuration for the offline library.

use std::path::PathBuf;

use crate::settings::IniSettingsStore;

/// Bitrate assumed for size estimates when the catalog gives none (bits/s).
pub const DEFAULT_ESTIMATED_BITRATE_BPS: u64 = 2_500_000;

/// Configuration for [`crate::OfflineLibrary`].
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Bitrate used by the default size source to turn a duration into bytes.
    pub estimated_bitrate_bps: u64,

    /// Location of the persisted license settings.
    ///
    /// `None` when no platform config directory exists.
    pub settings_path: Option<PathBuf>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            estimated_bitrate_bps: DEFAULT_ESTIMATED_BITRATE_BPS,
            settings_path: IniSettingsStore::default_path(),
        }
    }
}

impl LibraryConfig {
    /// Set the estimation bitrate.
    pub fn with_estimated_bitrate(mut self, bitrate_bps: u64) -> Self {
        self.estimated_bitrate_bps = bitrate_bps;
        self
    }

    /// Set the settings file location.
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LibraryConfig::default();
        assert_eq!(config.estimated_bitrate_bps, DEFAULT_ESTIMATED_BITRATE_BPS);
    }

    #[test]
    fn test_builder_pattern() {
        let config = LibraryConfig::default()
            .with_estimated_bitrate(8_000_000)
            .with_settings_path("/tmp/playoffline.ini");

        assert_eq!(config.estimated_bitrate_bps, 8_000_000);
        assert_eq!(
            config.settings_path,
            Some(PathBuf::from("/tmp/playoffline.ini"))
        );
    }
}
