//! Error types for stream monitoring.
//!
//! All errors implement the `std::error::Error` trait and carry the stream or
//! path they relate to, so a host loop can decide whether to keep going.
//!
//! ## Error Categories
//!
//! - **Lookup Errors**: a queue or stream name that the session does not know
//! - **Session Errors**: the device session closed or the host was interrupted
//! - **Sample Errors**: timestamps or sequence numbers outside representable range
//! - **Configuration Errors**: invalid YAML session files
//! - **Sink Errors**: output files that could not be written or flushed
//!
//! Arithmetic edge cases (zero elapsed time, negative latency, decreasing
//! sequence numbers) are data, not errors, and never show up here.
//!
//! ```rust
//! use depthwatch::StreamError;
//!
//! let error = StreamError::not_found("depth");
//! assert!(!error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for stream operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for stream operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Stream '{stream}' not found in session")]
    NotFound { stream: String },

    #[error("Session closed while reading stream '{stream}'")]
    SessionClosed { stream: String },

    #[error("Invalid sample on stream '{stream}': {details}")]
    InvalidSample { stream: String, details: String },

    #[error("Interrupted by shutdown signal")]
    Interrupted,

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error("Sink error: {path}")]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Provider failed: {reason}")]
    Provider {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StreamError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Provider { .. } => true,
            StreamError::Timeout { .. } => true,
            StreamError::NotFound { .. } => false,
            StreamError::SessionClosed { .. } => false,
            StreamError::InvalidSample { .. } => false,
            StreamError::Interrupted => false,
            StreamError::Config { .. } => false,
            StreamError::Sink { .. } => false,
        }
    }

    /// Returns whether the host loop should stop after seeing this error.
    pub fn ends_session(&self) -> bool {
        matches!(self, StreamError::SessionClosed { .. } | StreamError::Interrupted)
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::NotFound { .. } => vec![
                "Check the stream name spelling",
                "Verify the stream is declared in the session configuration",
            ],
            StreamError::SessionClosed { .. } => vec![
                "Check the device connection",
                "Reopen the device session",
            ],
            StreamError::InvalidSample { .. } => vec![
                "Check the producer clock domain",
                "Verify sequence numbers stay below i64::MAX",
            ],
            StreamError::Interrupted => vec!["Restart the monitor to resume statistics"],
            StreamError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Verify the device is still producing frames",
            ],
            StreamError::Config { .. } => vec![
                "Check the session YAML against the documented layout",
                "Ensure stream names are unique and queue sizes are positive",
            ],
            StreamError::Sink { .. } => vec![
                "Check the output directory exists and is writable",
                "Ensure sufficient disk space",
            ],
            StreamError::Provider { .. } => vec![
                "Check the device or trace source is reachable",
                "Retry after the transient failure clears",
            ],
        }
    }

    /// Helper constructor for unknown stream names.
    pub fn not_found(stream: impl Into<String>) -> Self {
        StreamError::NotFound { stream: stream.into() }
    }

    /// Helper constructor for closed sessions.
    pub fn session_closed(stream: impl Into<String>) -> Self {
        StreamError::SessionClosed { stream: stream.into() }
    }

    /// Helper constructor for rejected samples.
    pub fn invalid_sample(stream: impl Into<String>, details: impl Into<String>) -> Self {
        StreamError::InvalidSample { stream: stream.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        StreamError::Config { details: details.into() }
    }

    /// Helper constructor for sink errors with path context.
    pub fn sink_error(path: PathBuf, source: std::io::Error) -> Self {
        StreamError::Sink { path, source }
    }

    /// Helper constructor for provider failures.
    pub fn provider_failed(reason: impl Into<String>) -> Self {
        StreamError::Provider { reason: reason.into(), source: None }
    }

    /// Helper constructor for provider failures with source.
    pub fn provider_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Provider { reason: reason.into(), source: Some(source) }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Sink { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for StreamError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        StreamError::Config { details: err.to_string() }
    }
}
