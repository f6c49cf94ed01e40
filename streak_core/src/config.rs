//! Configuration file support for Streakr.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/streakr/config.toml`.

use crate::{Error, NotificationSettings, Permission, ReminderTime, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub reminders: ReminderConfig,

    #[serde(default)]
    pub workouts: WorkoutConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Defaults for the daily reminder before the user changes anything
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_reminders_enabled")]
    pub enabled: bool,

    #[serde(default = "default_reminder_time")]
    pub time: ReminderTime,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: default_reminders_enabled(),
            time: default_reminder_time(),
        }
    }
}

/// Daily workout rotation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkoutConfig {
    #[serde(default = "default_rotation")]
    pub rotation: Vec<String>,
}

impl Default for WorkoutConfig {
    fn default() -> Self {
        Self {
            rotation: default_rotation(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    base.join("streakr")
}

fn default_reminders_enabled() -> bool {
    true
}

fn default_reminder_time() -> ReminderTime {
    NotificationSettings::default().time
}

fn default_rotation() -> Vec<String> {
    vec![
        "Full-body circuit".into(),
        "Upper body".into(),
        "Lower body".into(),
        "Core & mobility".into(),
    ]
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("streakr").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<()> {
        if self.workouts.rotation.is_empty() {
            return Err(Error::Config("workouts.rotation must not be empty".into()));
        }
        if self.workouts.rotation.iter().any(|name| name.trim().is_empty()) {
            return Err(Error::Config(
                "workouts.rotation contains an empty name".into(),
            ));
        }
        Ok(())
    }

    /// Notification settings to use when none have been stored yet
    pub fn default_notification_settings(&self) -> NotificationSettings {
        NotificationSettings {
            enabled: self.reminders.enabled,
            time: self.reminders.time,
            permission: Permission::Unrequested,
        }
    }
}
