//! Error types for recording sessions and stream writers.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::StreamKind;

/// Errors that can occur while configuring, running or reading back a recording.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A buffer handed to the session does not match the configured geometry.
    #[error("{stream} buffer size mismatch: expected {expected} samples, got {actual}")]
    FrameSize {
        stream: StreamKind,
        expected: usize,
        actual: usize,
    },

    /// The depth-aligned color stream needs a projection collaborator.
    #[error("tracked color stream requires a depth-to-color projection")]
    MissingProjection,

    /// Session started with every stream disabled.
    #[error("no output streams are enabled")]
    NoActiveStreams,

    /// Operation requires an active recording.
    #[error("not recording")]
    NotRecording,

    /// A recording is already in progress.
    #[error("already recording")]
    AlreadyRecording,

    /// A writer thread stopped because persisting a frame failed.
    #[error("{stream} writer failed: {message}")]
    Writer { stream: StreamKind, message: String },

    /// A writer thread panicked.
    #[error("{0} writer thread panicked")]
    WriterPanicked(StreamKind),

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RecorderError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an InvalidConfig error with a message.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RecorderError>;
