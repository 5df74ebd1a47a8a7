//! Core error types for subterm

use std::path::PathBuf;
use std::time::Duration;

use st_protocol::{ProtocolError, RemoteError};
use thiserror::Error;

use crate::promise::Role;

/// Top-level error type for the subterm core
#[derive(Error, Debug)]
pub enum CoreError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Promise error
    #[error("Promise error: {0}")]
    Promise(#[from] PromiseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the duplex pipe
#[derive(Error, Debug)]
pub enum TransportError {
    /// I/O attempted on a closed pipe
    #[error("Pipe is closed")]
    Closed,

    /// `close()` called twice
    #[error("Pipe already closed")]
    AlreadyClosed,

    /// The far end went away while waiting for data
    #[error("Broken pipe")]
    BrokenPipe,

    /// Framing or serialization failure
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Underlying OS error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the channel is unusable from now on
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Closed | TransportError::AlreadyClosed | TransportError::BrokenPipe => {
                true
            }
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::UnexpectedEof
            ),
            TransportError::Protocol(_) => false,
        }
    }
}

impl From<&TransportError> for RemoteError {
    fn from(err: &TransportError) -> Self {
        if err.is_disconnect() {
            RemoteError::connection_aborted(err.to_string())
        } else {
            RemoteError::transport(err.to_string())
        }
    }
}

/// Errors raised by promise handles
#[derive(Error, Debug)]
pub enum PromiseError {
    /// Operation not permitted for this side of the promise
    #[error("{operation} is not permitted on the {role} side")]
    WrongRole {
        operation: &'static str,
        role: Role,
    },

    /// A second resolve/throw
    #[error("Promise already settled")]
    AlreadySettled,

    /// Deadline elapsed while waiting
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Waiting could never complete (nobody else can settle a local promise)
    #[error("Waiting would block forever")]
    WouldBlock,

    /// The promise settled with an error
    #[error("{0}")]
    Rejected(RemoteError),

    /// The helper thread running callbacks could not be started
    #[error("Failed to spawn callback thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Cross-process promise channel failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl PromiseError {
    /// The remote error carried by a rejected promise
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            PromiseError::Rejected(err) => Some(err),
            _ => None,
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Launch argument is not valid base64
    #[error("Invalid launch argument encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Launch argument payload is malformed
    #[error("Invalid launch argument payload: {0}")]
    Payload(#[from] bincode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use st_protocol::RemoteErrorKind;

    #[test]
    fn test_disconnect_maps_to_connection_aborted() {
        let err = TransportError::BrokenPipe;
        assert_eq!(RemoteError::from(&err).kind, RemoteErrorKind::ConnectionAborted);

        let err = TransportError::Protocol(ProtocolError::InvalidOperation("()".into()));
        assert_eq!(RemoteError::from(&err).kind, RemoteErrorKind::Transport);
    }

    #[test]
    fn test_wrong_role_message() {
        let err = PromiseError::WrongRole {
            operation: "resolve",
            role: Role::Owner,
        };
        assert_eq!(err.to_string(), "resolve is not permitted on the owner side");
    }
}
