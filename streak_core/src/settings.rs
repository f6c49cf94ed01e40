//! Notification settings persistence.
//!
//! The scheduler reads settings once at startup and writes them after every
//! change through a [`SettingsStore`].

use crate::{Error, NotificationSettings, Result};
use fs2::FileExt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Read/write access to persisted notification settings
pub trait SettingsStore {
    /// Load stored settings, `None` if nothing has been stored yet
    fn load(&self) -> Result<Option<NotificationSettings>>;

    fn save(&mut self, settings: &NotificationSettings) -> Result<()>;
}

/// JSON file store with file locking and atomic replace
#[derive(Clone, Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<Option<NotificationSettings>> {
        if !self.path.exists() {
            tracing::debug!("No settings file at {:?}", self.path);
            return Ok(None);
        }

        let file = File::open(&self.path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        let settings = serde_json::from_str(&contents)
            .map_err(|e| Error::Settings(format!("Corrupt settings file {:?}: {}", self.path, e)))?;
        tracing::debug!("Loaded notification settings from {:?}", self.path);
        Ok(Some(settings))
    }

    fn save(&mut self, settings: &NotificationSettings) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| Error::Settings("settings path missing parent".into()))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string_pretty(settings)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved notification settings to {:?}", self.path);
        Ok(())
    }
}

/// In-memory store, for tests and embedders without a filesystem
#[derive(Clone, Debug, Default)]
pub struct MemorySettingsStore {
    stored: Option<NotificationSettings>,
    saves: usize,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(settings: NotificationSettings) -> Self {
        Self {
            stored: Some(settings),
            saves: 0,
        }
    }

    pub fn stored(&self) -> Option<&NotificationSettings> {
        self.stored.as_ref()
    }

    /// Number of successful `save` calls
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Option<NotificationSettings>> {
        Ok(self.stored.clone())
    }

    fn save(&mut self, settings: &NotificationSettings) -> Result<()> {
        self.stored = Some(settings.clone());
        self.saves += 1;
        Ok(())
    }
}
