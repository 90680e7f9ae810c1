//! Error types for ILDA decoding and playback.
//!
//! All errors implement the `std::error::Error` trait and carry structured
//! context. Nothing in this crate terminates the process on error: decode and
//! configuration failures invalidate only the current file-open attempt, and
//! transport failures are surfaced while playback keeps running.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for playback operations.
pub type Result<T, E = PlayerError> = std::result::Result<T, E>;

/// Main error type for decoding and playback operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PlayerError {
    #[error("ILDA file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Decode error in {context}: {details}")]
    Decode { context: String, details: String },

    #[error("Transport acknowledgment not received within {timeout:?}")]
    TransportTimeout { timeout: Duration },

    #[error("No transport connected")]
    TransportUnavailable,

    #[error("Invalid {parameter}: {details}")]
    Config { parameter: String, details: String },

    #[error("Playback worker is no longer running")]
    Closed,
}

impl PlayerError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Transport conditions clear on their own once the link comes back;
    /// malformed files do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            PlayerError::TransportTimeout { .. } => true,
            PlayerError::TransportUnavailable => true,
            PlayerError::File { .. } => false,
            PlayerError::Decode { .. } => false,
            PlayerError::Config { .. } => false,
            PlayerError::Closed => false,
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        PlayerError::File { path, source }
    }

    /// Helper constructor for decode errors.
    pub fn decode(context: impl Into<String>, details: impl Into<String>) -> Self {
        PlayerError::Decode { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(parameter: impl Into<String>, details: impl Into<String>) -> Self {
        PlayerError::Config { parameter: parameter.into(), details: details.into() }
    }
}

impl From<std::io::Error> for PlayerError {
    fn from(err: std::io::Error) -> Self {
        PlayerError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
