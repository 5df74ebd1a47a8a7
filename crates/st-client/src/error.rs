//! Error types for st-client

use std::io;
use std::time::Duration;

use thiserror::Error;

use st_core::{ConfigError, PromiseError, TransportError};
use st_protocol::ProtocolError;

/// Errors raised by the controlling side of a remote window
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("remote window is closed")]
    Closed,

    #[error("remote window has already begun")]
    AlreadyStarted,

    #[error("remote window has not finished connecting")]
    NotReady,

    #[error("host exited before it was ready (exit code {exit_code:?})")]
    StartupFailed { exit_code: Option<i32> },

    #[error("unexpected handshake byte {0:#04x}")]
    Handshake(u8),

    #[error("host not ready after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("failed to launch host: {0}")]
    Spawn(#[source] io::Error),

    #[error("{0}")]
    Operation(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("promise error: {0}")]
    Promise(#[from] PromiseError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}
