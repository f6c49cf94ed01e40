//! Error types for the streak_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for streak_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Badge catalog validation error
    #[error("Badge catalog error: {0}")]
    Catalog(String),

    /// State management error
    #[error("State error: {0}")]
    State(String),

    /// Notification settings error (parsing or persistence)
    #[error("Settings error: {0}")]
    Settings(String),

    /// Failure reported by the notification platform
    #[error("Notification platform error: {0}")]
    Platform(String),

    /// Workout source error
    #[error("Workout source error: {0}")]
    Workout(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
