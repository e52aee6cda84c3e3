//! Error types for pan-dl library
//!
//! Every failure the engine can report, from probing to writing chunks.

use std::fmt;

use crate::core::planner::ChunkRange;

/// Main error type for pan-dl operations
#[derive(Debug)]
pub enum Error {
    /// Probe response without a usable `Content-Length`
    ProtocolError(String),

    /// Server answered with a structured error payload or an unexpected status
    RemoteError(String),

    /// Network-level failure, including a body that stopped short
    TransportError(String),

    /// Output file could not be created or written
    FilesystemError(std::io::Error),

    /// Invalid configuration or parameters
    InvalidInput(String),

    /// A retry policy gave up on a range
    RetriesExhausted {
        range: ChunkRange,
        attempts: u32,
        last: Box<Error>,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ProtocolError(msg) => {
                write!(f, "Protocol error: {}", msg)
            }
            Error::RemoteError(msg) => {
                write!(f, "Remote error: {}", msg)
            }
            Error::TransportError(msg) => {
                write!(f, "Transport error: {}", msg)
            }
            Error::FilesystemError(err) => {
                write!(f, "Filesystem error: {}", err)
            }
            Error::InvalidInput(msg) => {
                write!(f, "Invalid input: {}", msg)
            }
            Error::RetriesExhausted { range, attempts, last } => {
                write!(f, "Range {} failed after {} attempts: {}", range, attempts, last)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FilesystemError(err) => Some(err),
            Error::RetriesExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::FilesystemError(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::TransportError(err.to_string())
    }
}

/// Convenience result type for pan-dl operations
pub type Result<T> = std::result::Result<T, Error>;
