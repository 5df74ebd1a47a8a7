//! Startup configuration handed to a host process

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use st_protocol::CallbackId;

use crate::error::ConfigError;
use crate::pipe::PipeToken;

/// Everything a `subterm-host` needs to attach to its controller.
///
/// Travels as the host's single command-line argument: bincode, then base64
/// with the standard alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Controlling process, watched while waiting for the start byte
    pub parent_pid: u32,
    /// Terminal-level channel
    pub terminal: PipeToken,
    /// Widget-level channel
    pub widgets: PipeToken,
    pub tps: u32,
    pub width: u16,
    pub height: u16,
    /// Notified with the tick number before each frame is drawn
    pub before_draw: Option<CallbackId>,
    /// Notified with the tick number after each frame is drawn
    pub after_draw: Option<CallbackId>,
}

impl LaunchConfig {
    /// Encode as a command-line argument
    pub fn encode(&self) -> Result<String, ConfigError> {
        let bytes = bincode::serialize(self)?;
        Ok(STANDARD.encode(bytes))
    }

    /// Decode a command-line argument
    pub fn decode(arg: &str) -> Result<Self, ConfigError> {
        let bytes = STANDARD.decode(arg.trim())?;
        Ok(bincode::deserialize(&bytes)?)
    }
}
