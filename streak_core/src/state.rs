//! Tracker state persistence with file locking.
//!
//! This module handles saving and loading the core's persisted state
//! (stats, badge unlocks, pending celebrations, milestone dedup) with
//! file locking to prevent concurrent access issues. A caller that loads,
//! mutates and saves holds a [`StateLock`] for the whole cycle.

use crate::celebration::CelebrationQueue;
use crate::stats::level_for_xp;
use crate::{Error, Result, UserStats};
use chrono::NaiveDateTime;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Everything the core needs to resume a session
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerState {
    #[serde(default)]
    pub stats: UserStats,
    /// Badge id → unlock time
    #[serde(default)]
    pub unlocks: BTreeMap<String, NaiveDateTime>,
    #[serde(default)]
    pub celebrations: CelebrationQueue,
    /// Milestone notification tags already dispatched
    #[serde(default)]
    pub notified_milestones: BTreeSet<String>,
}

impl TrackerState {
    /// Load state from a file with shared locking
    ///
    /// Returns default state if file doesn't exist.
    /// If file is corrupted, logs a warning and returns default state.
    /// A stored level below what the stored XP earns is raised to match.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No state file found, using default state");
            return Ok(Self::default());
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(
                    "Unable to open state file {:?}: {}. Using defaults.",
                    path,
                    e
                );
                return Ok(Self::default());
            }
        };

        if let Err(e) = file.lock_shared() {
            tracing::warn!(
                "Unable to lock state file {:?}: {}. Using defaults.",
                path,
                e
            );
            return Ok(Self::default());
        }

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        if let Err(e) = reader.read_to_string(&mut contents) {
            let _ = file.unlock();
            tracing::warn!(
                "Failed to read state file {:?}: {}. Using defaults.",
                path,
                e
            );
            return Ok(Self::default());
        }

        file.unlock()?;

        match serde_json::from_str::<TrackerState>(&contents) {
            Ok(mut state) => {
                let level = level_for_xp(state.stats.xp).max(state.stats.level);
                if level != state.stats.level {
                    tracing::warn!(
                        "State level {} does not match {} XP, repairing to {}",
                        state.stats.level,
                        state.stats.xp,
                        level
                    );
                    state.stats.level = level;
                }
                tracing::debug!("Loaded tracker state from {:?}", path);
                Ok(state)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse state file {:?}: {}. Using defaults.",
                    path,
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Save state to a file with exclusive locking
    ///
    /// Atomically writes state by:
    /// 1. Writing to a temp file
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::State("state path missing parent".into()))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved tracker state to {:?}", path);
        Ok(())
    }

}

/// Exclusive lock on a data directory's state, released on drop
pub struct StateLock {
    file: File,
}

impl StateLock {
    /// Block until no other process holds the lock file at `path`
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        file.lock_exclusive()?;

        tracing::debug!("Acquired state lock {:?}", path);
        Ok(Self { file })
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to release state lock: {}", e);
        }
    }
}
