//! Request and response envelopes
//!
//! Two channels connect a controlling process to its host:
//!
//! - the **terminal channel** carries [`Request`]s addressed to the remote
//!   terminal and [`Response`]s back, including the termination notice
//!   (`id == 0`) and callback notifications (`id > 0`);
//! - the **widget channel** carries [`WidgetRequest`]s addressed to a single
//!   widget and [`WidgetResponse`]s back.
//!
//! # Startup handshake
//!
//! Before any frame flows, two raw bytes are exchanged on the terminal
//! channel:
//!
//! 1. Host writes [`READY_BYTE`] once it has opened both channels
//! 2. Controller writes [`START_BYTE`] when `begin()` is called
//!
//! Requests queued before `begin()` follow the start byte in order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, RemoteError};
use crate::id::{CorrelationId, WidgetId};
use crate::value::{Kwargs, Value};

/// Host to controller: both channels are open
pub const READY_BYTE: u8 = 0x00;

/// Controller to host: start running and accept requests
pub const START_BYTE: u8 = 0x01;

/// Trailing marker distinguishing a method call from an attribute read
const INVOKE_MARKER: &str = "()";

/// How an operation is applied to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Read an attribute
    Read,
    /// Invoke a method with arguments
    Invoke,
}

/// A named operation on a remote object.
///
/// On the wire this is a single string; a trailing `()` marks
/// [`Access::Invoke`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Operation {
    name: String,
    access: Access,
}

impl Operation {
    /// An attribute read
    pub fn read(name: impl Into<String>) -> Result<Self, ProtocolError> {
        Self::new(name.into(), Access::Read)
    }

    /// A method invocation
    pub fn invoke(name: impl Into<String>) -> Result<Self, ProtocolError> {
        Self::new(name.into(), Access::Invoke)
    }

    /// Names must be non-empty and free of the invoke marker, otherwise the
    /// wire form would not parse back to the same operation
    fn new(name: String, access: Access) -> Result<Self, ProtocolError> {
        if name.is_empty() || name.contains(INVOKE_MARKER) {
            return Err(ProtocolError::InvalidOperation(name));
        }
        Ok(Self { name, access })
    }

    /// Parse the wire form (`"width"` or `"putstr()"`)
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let (name, access) = match raw.strip_suffix(INVOKE_MARKER) {
            Some(name) => (name, Access::Invoke),
            None => (raw, Access::Read),
        };
        Self::new(name.to_string(), access)
            .map_err(|_| ProtocolError::InvalidOperation(raw.to_string()))
    }

    /// Operation name without the marker
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How the operation is applied
    pub fn access(&self) -> Access {
        self.access
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.access {
            Access::Read => f.write_str(&self.name),
            Access::Invoke => write!(f, "{}{}", self.name, INVOKE_MARKER),
        }
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        op.to_string()
    }
}

impl TryFrom<String> for Operation {
    type Error = ProtocolError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Operation::parse(&raw)
    }
}

impl std::str::FromStr for Operation {
    type Err = ProtocolError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Operation::parse(raw)
    }
}

/// Terminal-level request: `(operation, id, args, kwargs)`.
///
/// The operation travels in its wire form and is parsed by the receiver, so
/// a frame with an unparseable name still carries an ID to answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub operation: String,
    pub id: CorrelationId,
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

impl Request {
    /// Create a new request
    pub fn new(operation: Operation, id: CorrelationId, args: Vec<Value>, kwargs: Kwargs) -> Self {
        Self {
            operation: operation.to_string(),
            id,
            args,
            kwargs,
        }
    }

    /// The parsed operation
    pub fn operation(&self) -> Result<Operation, ProtocolError> {
        Operation::parse(&self.operation)
    }
}

/// Terminal-level response: `(id, success, payload)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: CorrelationId,
    pub result: Result<Value, RemoteError>,
}

impl Response {
    /// Create a new response
    pub fn new(id: CorrelationId, result: Result<Value, RemoteError>) -> Self {
        Self { id, result }
    }

    /// The termination notice `(0, true, reason)`
    pub fn shutdown(reason: Option<RemoteError>) -> Self {
        Self {
            id: CorrelationId::SHUTDOWN,
            result: Ok(reason.into()),
        }
    }

    /// Whether the call succeeded
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Widget-level request: `(widget, operation, id, args, kwargs)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetRequest {
    pub widget: WidgetId,
    pub operation: String,
    pub id: CorrelationId,
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

impl WidgetRequest {
    /// Create a new widget request
    pub fn new(
        widget: WidgetId,
        operation: Operation,
        id: CorrelationId,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Self {
        Self {
            widget,
            operation: operation.to_string(),
            id,
            args,
            kwargs,
        }
    }

    /// The parsed operation
    pub fn operation(&self) -> Result<Operation, ProtocolError> {
        Operation::parse(&self.operation)
    }
}

/// Widget-level response: `(widget, id, success, payload)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetResponse {
    pub widget: WidgetId,
    pub id: CorrelationId,
    pub result: Result<Value, RemoteError>,
}

impl WidgetResponse {
    /// Create a new widget response
    pub fn new(widget: WidgetId, id: CorrelationId, result: Result<Value, RemoteError>) -> Self {
        Self { widget, id, result }
    }

    /// Whether the call succeeded
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}
