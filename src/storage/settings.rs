// Persisted user settings (single JSON record)

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::models::Settings;

/// Reads and writes the one `settings.json` of an installation.
///
/// Settings are best-effort: [`SettingsStore::load`] and
/// [`SettingsStore::save`] never fail, they log and fall back to defaults.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the settings, materializing defaults on first run.
    ///
    /// A malformed file yields defaults in memory and is left on disk as-is.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("{e}; using default settings");
                Settings::default()
            }
        }
    }

    pub fn try_load(&self) -> Result<Settings, ConfigError> {
        if !self.path.exists() {
            let defaults = Settings::default();
            self.try_save(&defaults)?;
            debug!(path = %self.path.display(), "created default settings");
            return Ok(defaults);
        }

        let contents = fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, settings: &Settings) {
        if let Err(e) = self.try_save(settings) {
            warn!("{e}");
        }
    }

    pub fn try_save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(settings)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        fs::write(&self.path, contents).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
