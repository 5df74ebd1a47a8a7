//! st-protocol: Wire protocol for subterm remote windows
//!
//! This crate defines the framing, envelopes and value model exchanged
//! between a controlling process and the `subterm-host` process that owns
//! the real terminal.

pub mod allocator;
pub mod codec;
pub mod error;
pub mod frame;
pub mod id;
pub mod key;
pub mod message;
pub mod value;

pub use allocator::IdAllocator;
pub use codec::MessageCodec;
pub use error::{ProtocolError, RemoteError, RemoteErrorKind};
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use id::{CallbackId, CorrelationId, WidgetId};
pub use message::{
    Access, Operation, Request, Response, WidgetRequest, WidgetResponse, READY_BYTE, START_BYTE,
};
pub use value::{Kwargs, Value};
