//! Error types for Skiff
//!
//! [`SkiffError`] classifies failures by *disposition* rather than by
//! origin: an application embedding the stack mostly needs to know
//! whether the session is still usable, not which syscall failed.
//! `Timeout` is deliberately its own variant - an expired deadline
//! leaves the session intact and is never reported as a connection
//! failure, while everything else means the pipe or its cryptographic
//! state is gone.

use std::fmt;

/// Unified error type for all Skiff operations
#[derive(Debug)]
pub enum SkiffError {
    /// Connection failure: name resolution, connect, or an established
    /// pipe dropping
    Connection(String),

    /// A deadline expired; the session is still usable
    Timeout(String),

    /// The peer violated the wire protocol
    Protocol(String),

    /// Integrity or key-material failure
    Security(String),

    /// Invalid configuration or calling sequence
    Config(String),

    /// Underlying I/O error with its source preserved
    Io(std::io::Error),
}

impl SkiffError {
    /// Returns whether the session this error came from is unusable.
    ///
    /// Only timeouts are recoverable: the caller may retry the same
    /// operation against the same session. Every other variant means
    /// teardown.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SkiffError::Timeout(_))
    }
}

impl fmt::Display for SkiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkiffError::Connection(msg) => write!(f, "connection failed: {}", msg),
            SkiffError::Timeout(op) => write!(f, "timed out: {}", op),
            SkiffError::Protocol(msg) => write!(f, "protocol violation: {}", msg),
            SkiffError::Security(msg) => write!(f, "security failure: {}", msg),
            SkiffError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            SkiffError::Io(e) => write!(f, "I/O failure: {}", e),
        }
    }
}

impl std::error::Error for SkiffError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SkiffError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SkiffError {
    fn from(err: std::io::Error) -> Self {
        SkiffError::Io(err)
    }
}

/// Result type for Skiff operations
pub type SkiffResult<T> = Result<T, SkiffError>;
