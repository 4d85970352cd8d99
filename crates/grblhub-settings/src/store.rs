//! Settings persistence
//!
//! Loads and saves the configuration document and exposes it to the
//! controller through the [`ConfigSource`] trait. The store keeps the
//! parsed document in memory; `reload` re-reads the file.

use grblhub_core::{ConfigSource, EventHook, MacroDef};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, SettingsError};

/// File-backed configuration store.
pub struct FileConfigStore {
    path: PathBuf,
    config: RwLock<Config>,
}

impl FileConfigStore {
    /// Load the document at `path`, falling back to defaults when the file
    /// does not exist yet.
    pub fn load_or_default(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                tracing::error!("Malformed config {}: {}", path.display(), e);
                SettingsError::Parse {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", path.display());
                Config::default()
            }
            Err(e) => return Err(SettingsError::Io(e)),
        };

        Ok(Self {
            path,
            config: RwLock::new(config),
        })
    }

    /// Write the current document back to disk.
    pub fn save(&self) -> Result<()> {
        let config = self.config.read();
        let text = serde_json::to_string_pretty(&*config).map_err(|e| SettingsError::Parse {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(&self.path, text).map_err(SettingsError::Io)?;
        Ok(())
    }

    /// Re-read the document from disk.
    pub fn reload(&self) -> Result<()> {
        let text = std::fs::read_to_string(&self.path).map_err(SettingsError::Io)?;
        let parsed: Config = serde_json::from_str(&text).map_err(|e| SettingsError::Parse {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        *self.config.write() = parsed;
        Ok(())
    }

    /// Current document snapshot.
    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    /// Replace the in-memory document.
    pub fn set_config(&self, config: Config) {
        *self.config.write() = config;
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigStore {
    fn macros(&self) -> Vec<MacroDef> {
        self.config.read().macros.clone()
    }

    fn event_hooks(&self) -> Vec<EventHook> {
        self.config.read().events.clone()
    }
}
