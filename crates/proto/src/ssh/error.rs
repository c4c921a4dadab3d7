//! Error types for SSH transport operations
//!
//! This module defines a unified error type for the transport layer:
//! socket setup, framing, per-packet cryptography, and worker teardown.
//!
//! Timeouts are a distinct condition from connection failure: a
//! [`Error::Timeout`] leaves the transport usable, while [`Error::Dropped`],
//! [`Error::MacMismatch`], and the framing errors are fatal to the
//! connection.

use skiff_platform::SkiffError;
use std::fmt;

/// Result type for SSH transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// SSH transport errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Host name did not resolve to any address
    Dns(String),

    /// Socket could not be created
    SocketCreate(String),

    /// TCP or AF_UNIX connect was refused or unreachable
    Connect(String),

    /// Peer closed or reset the connection while the transport was running
    Dropped,

    /// A readiness or queue wait exceeded the session timeout
    Timeout,

    /// Declared packet length exceeds the maximum
    PacketTooLarge(u32),

    /// Declared packet length or padding is out of range
    MalformedPacket(String),

    /// Computed MAC does not match the received trailer
    MacMismatch,

    /// Crypto provider rejected a frame
    EncryptFail(String),

    /// Transport is not running (never started, or already torn down)
    Closed,

    /// I/O error
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Dns(host) => write!(f, "Host not found: {}", host),
            Error::SocketCreate(msg) => write!(f, "Failed to create socket: {}", msg),
            Error::Connect(msg) => write!(f, "Unable to connect: {}", msg),
            Error::Dropped => write!(f, "Connection dropped"),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::PacketTooLarge(len) => {
                write!(f, "Packet too large: {} bytes", len)
            }
            Error::MalformedPacket(msg) => write!(f, "Malformed packet: {}", msg),
            Error::MacMismatch => write!(f, "MAC verification failed"),
            Error::EncryptFail(msg) => write!(f, "Encryption failed: {}", msg),
            Error::Closed => write!(f, "Transport is not running"),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// Convert from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<Error> for SkiffError {
    fn from(err: Error) -> Self {
        match err {
            Error::Timeout => SkiffError::Timeout("transport operation".to_string()),
            Error::MacMismatch | Error::EncryptFail(_) => {
                SkiffError::Security(err.to_string())
            }
            Error::PacketTooLarge(_) | Error::MalformedPacket(_) => {
                SkiffError::Protocol(err.to_string())
            }
            Error::Dns(_)
            | Error::SocketCreate(_)
            | Error::Connect(_)
            | Error::Dropped
            | Error::Closed => SkiffError::Connection(err.to_string()),
            Error::Io(msg) => SkiffError::Io(std::io::Error::other(msg)),
        }
    }
}
