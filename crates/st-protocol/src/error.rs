//! Protocol error types

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: u64, max: usize },

    /// Operation string could not be parsed
    #[error("Invalid operation name: {0:?}")]
    InvalidOperation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Category of a failure reported by the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteErrorKind {
    /// No widget with the requested ID
    Index,
    /// No operation registered under the requested name and access
    UnknownOperation,
    /// Argument missing or of the wrong type
    InvalidArgument,
    /// The operation ran and failed
    Execution,
    /// Cooperative cancellation: the remote loop should exit
    Cancelled,
    /// Interruption (Ctrl-C style): the remote loop should exit
    Interrupted,
    /// The connection went away before a response arrived
    ConnectionAborted,
    /// Local transport failure while sending the request
    Transport,
}

impl RemoteErrorKind {
    /// Whether this kind asks the remote loop to shut down
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Interrupted)
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteErrorKind::Index => "index error",
            RemoteErrorKind::UnknownOperation => "unknown operation",
            RemoteErrorKind::InvalidArgument => "invalid argument",
            RemoteErrorKind::Execution => "execution error",
            RemoteErrorKind::Cancelled => "cancelled",
            RemoteErrorKind::Interrupted => "interrupted",
            RemoteErrorKind::ConnectionAborted => "connection aborted",
            RemoteErrorKind::Transport => "transport error",
        };
        f.write_str(name)
    }
}

/// Serializable error value carried in failed responses
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Failure category
    pub kind: RemoteErrorKind,
    /// Human-readable message
    pub message: String,
}

impl RemoteError {
    /// Create a new remote error
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Index, message)
    }

    pub fn unknown_operation(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::UnknownOperation, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::InvalidArgument, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Execution, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Cancelled, message)
    }

    pub fn connection_aborted(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::ConnectionAborted, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transport, message)
    }

    /// Whether this error asks the remote loop to shut down
    pub fn is_cancellation(&self) -> bool {
        self.kind.is_cancellation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::index("No such widget - 42");
        assert_eq!(err.to_string(), "index error: No such widget - 42");
    }

    #[test]
    fn test_cancellation_kinds() {
        assert!(RemoteError::cancelled("bye").is_cancellation());
        assert!(RemoteError::new(RemoteErrorKind::Interrupted, "^C").is_cancellation());
        assert!(!RemoteError::execution("boom").is_cancellation());
    }
}
