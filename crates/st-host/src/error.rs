//! Host error types

use st_core::{ConfigError, TransportError};
use thiserror::Error;

/// Process exit code when the controller died before sending the start byte
pub const EXIT_PARENT_GONE: i32 = 254;

/// Process exit code when the start byte was wrong
pub const EXIT_BAD_START: i32 = 255;

/// Errors that stop a host
#[derive(Error, Debug)]
pub enum HostError {
    /// Pipe failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Launch argument could not be decoded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The controlling process went away before starting the host
    #[error("Controlling process {0} is gone")]
    ParentGone(u32),

    /// The controller sent something other than the start byte
    #[error("Unexpected start byte {0:#04x}")]
    BadStartByte(u8),

    /// Drawing to the console failed
    #[error("Render error: {0}")]
    Render(#[from] std::io::Error),
}

impl HostError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            HostError::ParentGone(_) => EXIT_PARENT_GONE,
            HostError::BadStartByte(_) => EXIT_BAD_START,
            _ => 1,
        }
    }
}
