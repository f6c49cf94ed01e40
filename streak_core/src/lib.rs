#![forbid(unsafe_code)]

//! Core engine for the Streakr habit tracker.
//!
//! This crate provides:
//! - Stats and streak tracking with XP levels
//! - Badge catalog and unlock evaluation
//! - Celebration queue for newly unlocked badges
//! - Permission-gated notification channel and reminder scheduler
//! - Persistence (state, settings, notification outbox) and configuration

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod stats;
pub mod badges;
pub mod celebration;
pub mod channel;
pub mod platform;
pub mod settings;
pub mod scheduler;
pub mod workout;
pub mod state;
pub mod engine;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use badges::{Badge, BadgeBook, BadgeCondition};
pub use celebration::{CelebrationQueue, CELEBRATION_DISPLAY_DURATION};
pub use channel::{NotificationChannel, NotificationPlatform, ShownNotification};
pub use platform::{read_outbox, still_visible, OutboxPlatform, OutboxRecord, PromptMode};
pub use settings::{JsonSettingsStore, MemorySettingsStore, SettingsStore};
pub use scheduler::{NotificationScheduler, ScheduledReminder, TickReport};
pub use workout::{RotationSource, Workout, WorkoutSource};
pub use state::{StateLock, TrackerState};
pub use engine::{PipelineOutcome, Tracker};
