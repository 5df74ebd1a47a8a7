//! st-core: Transport, promises and configuration for subterm
//!
//! This crate provides the duplex pipe carrying frames between a controlling
//! process and its remote terminal host, the single-assignment promise family
//! used to wait for remote results, and the configuration shared by the
//! binaries.

pub mod config;
pub mod error;
pub mod pipe;
pub mod process;
pub mod promise;
pub mod sync;

mod sys;

pub use error::{ConfigError, CoreError, PromiseError, TransportError};
pub use pipe::{DuplexPipe, PipeRole, PipeToken, POLL_INVALID};
pub use process::{is_process_alive, ChildProcess, RemoteProcess};
pub use promise::{LocalPromise, ProcessPromise, ProcessPromiseToken, Promise, Role, ThreadPromise};
