//! st-client: Drive a remote terminal window from the controlling process
//!
//! ```no_run
//! use st_client::{Promise, WindowBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let window = WindowBuilder::default().spawn()?;
//! let width = window.width()?;
//! window.putstr("hello", Some(0), Some(0))?;
//! window.begin()?;
//!
//! println!("{} columns", width.wait(None)?);
//! window.close();
//! # Ok(())
//! # }
//! ```

mod callback;
pub mod error;
mod launch;
mod link;
mod pending;
mod resolver;
pub mod widget;
pub mod window;

pub use callback::Callback;
pub use error::ProxyError;
pub use launch::HOST_BINARY;
pub use link::ConnectionState;
pub use widget::SerializedWidget;
pub use window::{WindowBuilder, WindowTerminal};

pub use st_core::config::WindowConfig;
pub use st_core::{Promise, PromiseError, RemoteProcess, ThreadPromise};
pub use st_protocol::{key, CallbackId, Kwargs, Operation, RemoteError, RemoteErrorKind, Value, WidgetId};
