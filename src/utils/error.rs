//! Error types for LEDPro
//!
//! This module defines the error taxonomy used throughout the crate.
//! We use thiserror for the error type and anyhow only at the binary
//! boundary. Components return these errors; callers decide whether to
//! report, log or ignore them.

use serde::Serialize;
use thiserror::Error;

/// Main error type for LEDPro
#[derive(Error, Debug)]
pub enum PlayerError {
    /// Playlist index outside `[0, len)`
    #[error("Index {index} out of range for playlist of {len} items")]
    OutOfRange { index: i64, len: usize },

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// State snapshot could not be written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Playback engine call failed
    #[error("Engine error: {0}")]
    Engine(String),

    /// A telemetry source failed
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Requested display is not connected
    #[error("Display {0} is not connected")]
    DisplayUnavailable(usize),

    /// Surface operation failed
    #[error("Surface error: {0}")]
    Surface(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Command channel closed
    #[error("Dispatcher unavailable: {0}")]
    Dispatcher(String),

    /// Control request rejected by the access policy
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),
}

/// Coarse classification of a [`PlayerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Persistence,
    Engine,
    Telemetry,
    DisplayTopology,
    Surface,
    Config,
    Dispatcher,
    AccessDenied,
    Io,
}

impl PlayerError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlayerError::OutOfRange { .. }
            | PlayerError::InvalidInput(_)
            | PlayerError::NotFound(_) => ErrorKind::Validation,
            PlayerError::Persistence(_) => ErrorKind::Persistence,
            PlayerError::Engine(_) => ErrorKind::Engine,
            PlayerError::Telemetry(_) => ErrorKind::Telemetry,
            PlayerError::DisplayUnavailable(_) => ErrorKind::DisplayTopology,
            PlayerError::Surface(_) => ErrorKind::Surface,
            PlayerError::Config(_) => ErrorKind::Config,
            PlayerError::Dispatcher(_) => ErrorKind::Dispatcher,
            PlayerError::AccessDenied(_) => ErrorKind::AccessDenied,
            PlayerError::FileIO(_) => ErrorKind::Io,
        }
    }

    /// Whether the caller supplied a bad argument
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Create an engine error from string
    pub fn engine<S: Into<String>>(msg: S) -> Self {
        PlayerError::Engine(msg.into())
    }
}

/// Convenience type alias for Results in LEDPro
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Extension trait for converting other errors to PlayerError
pub trait IntoPlayerError<T> {
    /// Convert this error into a PlayerError with the given context
    fn persistence_err(self, context: &str) -> Result<T>;
    fn telemetry_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlayerError<T> for std::result::Result<T, E> {
    fn persistence_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Persistence(format!("{}: {}", context, e)))
    }

    fn telemetry_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Telemetry(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Config(format!("{}: {}", context, e)))
    }
}
