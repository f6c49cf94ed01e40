//! Core domain types for the Streakr system.
//!
//! This module defines the fundamental types shared by the components:
//! - User progress statistics
//! - Notification permission and settings
//! - Notifications and their handles

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Progress Types
// ============================================================================

/// Snapshot of a user's habit progress
///
/// `level` is always derived from `xp` through the level table in
/// [`crate::stats`]. A fresh user starts at level 1 with everything else zero.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStats {
    pub streak: u32,
    pub total_workouts: u32,
    pub level: u32,
    pub xp: u32,
    /// Calendar day of the most recent completed workout
    #[serde(default)]
    pub last_workout_on: Option<NaiveDate>,
}

impl Default for UserStats {
    fn default() -> Self {
        Self {
            streak: 0,
            total_workouts: 0,
            level: 1,
            xp: 0,
            last_workout_on: None,
        }
    }
}

// ============================================================================
// Notification Settings Types
// ============================================================================

/// Permission state of the notification platform
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    #[default]
    Unrequested,
    Granted,
    Denied,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Permission::Unrequested => "unrequested",
            Permission::Granted => "granted",
            Permission::Denied => "denied",
        };
        f.write_str(s)
    }
}

/// Time of day for the daily reminder, written as `HH:MM`
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct ReminderTime(NaiveTime);

impl ReminderTime {
    /// Build a reminder time from an hour (0-23) and minute (0-59)
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for ReminderTime {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let trimmed = s.trim();
        let (hour, minute) = trimmed
            .split_once(':')
            .ok_or_else(|| crate::Error::Settings(format!("Invalid time '{}': expected HH:MM", s)))?;

        let parse = |part: &str| -> Option<u32> {
            if part.is_empty() || part.len() > 2 || !part.chars().all(|c| c.is_ascii_digit()) {
                None
            } else {
                part.parse().ok()
            }
        };

        match (parse(hour), parse(minute)) {
            (Some(h), Some(m)) => Self::from_hm(h, m).ok_or_else(|| {
                crate::Error::Settings(format!("Invalid time '{}': out of range", s))
            }),
            _ => Err(crate::Error::Settings(format!(
                "Invalid time '{}': expected HH:MM",
                s
            ))),
        }
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

impl TryFrom<String> for ReminderTime {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        value.parse()
    }
}

impl From<ReminderTime> for String {
    fn from(value: ReminderTime) -> Self {
        value.to_string()
    }
}

/// User-facing notification settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub time: ReminderTime,
    #[serde(default)]
    pub permission: Permission,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            time: ReminderTime(NaiveTime::from_hms_opt(19, 0, 0).unwrap_or_default()),
            permission: Permission::Unrequested,
        }
    }
}

impl NotificationSettings {
    /// Whether the daily reminder may be scheduled
    pub fn reminders_eligible(&self) -> bool {
        self.enabled && self.permission == Permission::Granted
    }
}

/// Partial settings change; `None` fields are left untouched
///
/// Permission is deliberately absent: it only changes through the
/// permission-request flow.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NotificationSettingsUpdate {
    pub enabled: Option<bool>,
    pub time: Option<ReminderTime>,
}

impl NotificationSettingsUpdate {
    pub fn time(time: ReminderTime) -> Self {
        Self {
            time: Some(time),
            ..Self::default()
        }
    }

    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }
}

// ============================================================================
// Notification Types
// ============================================================================

/// A notification to present through the platform
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Dedup key: a new notification replaces any visible one with the same tag
    pub tag: String,
    /// Keep the notification until the user dismisses it
    pub require_interaction: bool,
}

/// Handle to a notification shown by the channel
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NotificationHandle(pub Uuid);

impl NotificationHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NotificationHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
