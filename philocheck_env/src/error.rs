//! Error types for the subject-process abstraction.

use thiserror::Error;

/// Errors that can occur while launching or supervising a subject.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Subject executable does not exist or is not a regular file
    #[error("Subject executable not found: {0}")]
    MissingExecutable(String),

    /// Process could not be started
    #[error("Failed to spawn {path}: {reason}")]
    SpawnFailed { path: String, reason: String },

    /// Reading from or waiting on the process failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Termination signal could not be delivered
    #[error("Signal error: {0}")]
    Signal(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a spawn error.
    pub fn spawn(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::SpawnFailed {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates an I/O error.
    pub fn io(err: impl std::fmt::Display) -> Self {
        Self::Io(err.to_string())
    }

    /// True when the subject never started, as opposed to misbehaving later.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Self::MissingExecutable(_) | Self::SpawnFailed { .. })
    }
}
