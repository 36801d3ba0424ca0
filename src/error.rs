//! Error types for slidegate.

use std::time::Duration;

use thiserror::Error;

/// Main error type for slidegate setup and configuration.
#[derive(Error, Debug)]
pub enum SlidegateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A limiter was configured with a request limit of zero
    #[error("Request limit must be positive")]
    InvalidLimit,

    /// A limiter was configured with a zero-length window
    #[error("Window length must be positive, got {0:?}")]
    InvalidWindow(Duration),

    /// A response header name could not be parsed
    #[error("Invalid response header name: {0:?}")]
    InvalidHeaderName(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a counter backend to read or record counts.
///
/// The decision engine never turns one of these into an admit or a reject;
/// the caller decides whether to fail open or closed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backing store could not be reached or refused the operation
    #[error("Counter backend unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer within the configured deadline
    #[error("Counter backend timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type alias for slidegate operations.
pub type Result<T> = std::result::Result<T, SlidegateError>;
