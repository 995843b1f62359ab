//! Error types for sable-core.

use thiserror::Error;

/// Result type for sable-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sable-core.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An external command could not be started.
    #[error("failed to run command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File watcher error.
    #[error("file watch error: {0}")]
    Watch(String),

    /// The analysis engine reported a failure.
    #[error("analysis engine error: {0}")]
    Engine(String),

    /// The parse scheduler has been shut down.
    #[error("parse scheduler stopped")]
    SchedulerStopped,

    /// Keystrokes were forwarded while no child process was running.
    #[error("no foreground process")]
    NoForegroundProcess,
}

impl Error {
    /// Shorthand for engine implementations reporting a failure.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }
}
