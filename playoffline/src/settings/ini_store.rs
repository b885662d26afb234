//! INI-backed settings store.
//!
//! File layout:
//!
//! ```ini
//! [license]
//! type = rental
//! rental_duration_secs = 3600
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use tracing::{info, warn};

use super::{LicensePolicy, SettingsError, SettingsStore};

const SECTION: &str = "license";
const KEY_TYPE: &str = "type";
const KEY_RENTAL_DURATION: &str = "rental_duration_secs";

/// Settings persisted to an INI file.
///
/// The policy is read once when the store is opened and cached; writes go
/// straight to disk.
#[derive(Debug)]
pub struct IniSettingsStore {
    path: PathBuf,
    policy: LicensePolicy,
}

impl IniSettingsStore {
    /// Default settings location: `<config_dir>/playoffline/settings.ini`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("playoffline").join("settings.ini"))
    }

    /// Open a store, reading the current policy.
    ///
    /// A missing file yields the default policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or holds an
    /// invalid value.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let policy = Self::load(&path)?;
        Ok(Self { path, policy })
    }

    /// Open a store, falling back to the default policy on any read error.
    pub fn open_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let policy = match Self::load(&path) {
            Ok(policy) => policy,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Using default license policy");
                LicensePolicy::default()
            }
        };
        Self { path, policy }
    }

    /// Read the policy stored at `path`.
    pub fn load(path: &Path) -> Result<LicensePolicy, SettingsError> {
        if !path.exists() {
            return Ok(LicensePolicy::default());
        }

        let ini = read_ini(path)?;

        let Some(section) = ini.section(Some(SECTION)) else {
            return Ok(LicensePolicy::default());
        };

        match section.get(KEY_TYPE).map(|v| v.trim().to_lowercase()) {
            None => Ok(LicensePolicy::default()),
            Some(kind) if kind == "purchase" => Ok(LicensePolicy::Purchase),
            Some(kind) if kind == "rental" => {
                let duration = match section.get(KEY_RENTAL_DURATION) {
                    None => super::DEFAULT_RENTAL_DURATION,
                    Some(raw) => {
                        let secs: u64 =
                            raw.trim()
                                .parse()
                                .map_err(|_| SettingsError::InvalidValue {
                                    key: format!("{}.{}", SECTION, KEY_RENTAL_DURATION),
                                    value: raw.to_string(),
                                })?;
                        Duration::from_secs(secs)
                    }
                };
                LicensePolicy::rental(duration)
            }
            Some(other) => Err(SettingsError::InvalidValue {
                key: format!("{}.{}", SECTION, KEY_TYPE),
                value: other,
            }),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, policy: LicensePolicy) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // Keep unrelated sections intact; refuse to overwrite a file we
        // cannot parse.
        let mut ini = if self.path.exists() {
            read_ini(&self.path)?
        } else {
            Ini::new()
        };

        match policy {
            LicensePolicy::Purchase => {
                ini.with_section(Some(SECTION)).set(KEY_TYPE, "purchase");
                if let Some(section) = ini.section_mut(Some(SECTION)) {
                    section.remove(KEY_RENTAL_DURATION);
                }
            }
            LicensePolicy::Rental { duration } => {
                ini.with_section(Some(SECTION))
                    .set(KEY_TYPE, "rental")
                    .set(KEY_RENTAL_DURATION, duration.as_secs().to_string());
            }
        }

        ini.write_to_file(&self.path)
            .map_err(|source| SettingsError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

fn read_ini(path: &Path) -> Result<Ini, SettingsError> {
    Ini::load_from_file(path).map_err(|e| match e {
        ini::Error::Io(source) => SettingsError::Io {
            path: path.to_path_buf(),
            source,
        },
        ini::Error::Parse(parse) => SettingsError::Parse {
            path: path.to_path_buf(),
            reason: parse.to_string(),
        },
    })
}

impl SettingsStore for IniSettingsStore {
    fn license_policy(&self) -> LicensePolicy {
        self.policy
    }

    fn set_license_policy(&mut self, policy: LicensePolicy) -> Result<(), SettingsError> {
        if policy.rental_duration().is_some_and(|d| d.as_secs() == 0) {
            return Err(SettingsError::ZeroRentalDuration);
        }
        self.save(policy)?;
        info!(path = %self.path.display(), policy = %policy, "License policy saved");
        self.policy = policy;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings_path(dir: &TempDir) -> PathBuf {
        dir.path().join("nested").join("settings.ini")
    }

    #[test]
    fn test_missing_file_yields_default() {
        let dir = TempDir::new().unwrap();
        let store = IniSettingsStore::open(settings_path(&dir)).unwrap();
        assert_eq!(store.license_policy(), LicensePolicy::default());
    }

    #[test]
    fn test_save_and_reload_purchase() {
        let dir = TempDir::new().unwrap();
        let path = settings_path(&dir);

        let mut store = IniSettingsStore::open(&path).unwrap();
        store.set_license_policy(LicensePolicy::Purchase).unwrap();

        let reopened = IniSettingsStore::open(&path).unwrap();
        assert_eq!(reopened.license_policy(), LicensePolicy::Purchase);
    }

    #[test]
    fn test_save_and_reload_rental() {
        let dir = TempDir::new().unwrap();
        let path = settings_path(&dir);
        let rental = LicensePolicy::rental(Duration::from_secs(7200)).unwrap();

        let mut store = IniSettingsStore::open(&path).unwrap();
        store.set_license_policy(rental).unwrap();

        assert_eq!(IniSettingsStore::load(&path).unwrap(), rental);
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("rental_duration_secs=7200"));
    }

    #[test]
    fn test_invalid_type_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.ini");
        fs::write(&path, "[license]\ntype = lease\n").unwrap();

        let err = IniSettingsStore::open(&path).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { .. }));

        let fallback = IniSettingsStore::open_or_default(&path);
        assert_eq!(fallback.license_policy(), LicensePolicy::default());
    }

    #[test]
    fn test_zero_rental_duration_in_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.ini");
        fs::write(&path, "[license]\ntype = rental\nrental_duration_secs = 0\n").unwrap();

        assert!(matches!(
            IniSettingsStore::load(&path),
            Err(SettingsError::ZeroRentalDuration)
        ));
    }

    #[test]
    fn test_unparseable_duration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.ini");
        fs::write(&path, "[license]\ntype = rental\nrental_duration_secs = soon\n").unwrap();

        let err = IniSettingsStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("license.rental_duration_secs"));
    }

    #[test]
    fn test_unrelated_sections_survive_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.ini");
        fs::write(&path, "[player]\nautoplay = true\n").unwrap();

        let mut store = IniSettingsStore::open(&path).unwrap();
        store.set_license_policy(LicensePolicy::Purchase).unwrap();

        let ini = Ini::load_from_file(&path).unwrap();
        assert_eq!(
            ini.section(Some("player")).and_then(|s| s.get("autoplay")),
            Some("true")
        );
    }

    #[test]
    fn test_save_refuses_to_overwrite_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.ini");
        let original = "[player]\nautoplay = true\n[broken\n";
        fs::write(&path, original).unwrap();

        let mut store = IniSettingsStore::open_or_default(&path);
        let err = store
            .set_license_policy(LicensePolicy::Purchase)
            .unwrap_err();

        assert!(matches!(err, SettingsError::Parse { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert_eq!(store.license_policy(), LicensePolicy::default());
    }
}
