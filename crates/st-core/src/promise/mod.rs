//! Single-assignment promises
//!
//! A promise starts **pending** and settles exactly once, either fulfilled
//! with a value or failed with a [`RemoteError`]. Every handle carries a
//! [`Role`] fixed when it is built:
//!
//! - the [`Role::Owner`] created the promise and is the only side that may
//!   `wait` on it or attach callbacks with `then`;
//! - a [`Role::Peer`] handle is the only side that may `resolve` or `throw`.
//!
//! Three flavors share the [`Promise`] contract and differ in where the peer
//! lives: [`LocalPromise`] (same thread), [`ThreadPromise`] (another thread)
//! and [`ProcessPromise`] (another process, linked by an anonymous pipe).

mod local;
mod process;
mod thread;

pub use local::LocalPromise;
pub use process::{ProcessPromise, ProcessPromiseToken};
pub use thread::ThreadPromise;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use st_protocol::RemoteError;

use crate::error::PromiseError;

/// Settled outcome of a promise
pub type Outcome<T> = Result<T, RemoteError>;

/// Which side of a promise a handle is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Created the promise; waits and attaches callbacks
    Owner,
    /// Settles the promise
    Peer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => f.write_str("owner"),
            Role::Peer => f.write_str("peer"),
        }
    }
}

/// Shared contract of every promise flavor
pub trait Promise<T> {
    /// Side this handle acts for
    fn role(&self) -> Role;

    /// Fulfill with `value`
    fn resolve(&self, value: T) -> Result<(), PromiseError>;

    /// Fail with `error`
    fn throw(&self, error: RemoteError) -> Result<(), PromiseError>;

    /// Block until settled, or until `timeout` elapses
    fn wait(&self, timeout: Option<Duration>) -> Result<T, PromiseError>;

    /// Like [`wait`](Promise::wait) but an elapsed deadline yields `Ok(None)`
    fn try_wait(&self, timeout: Option<Duration>) -> Result<Option<T>, PromiseError> {
        match self.wait(timeout) {
            Ok(value) => Ok(Some(value)),
            Err(PromiseError::Timeout(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether the promise has settled
    fn fulfilled(&self) -> bool;

    /// `None` while pending, otherwise whether it failed
    fn has_failed(&self) -> Option<bool>;

    /// Run `callback` with the outcome once the promise settles
    fn then<F>(&self, callback: F) -> Result<(), PromiseError>
    where
        F: FnOnce(&Outcome<T>) + Send + 'static;
}

pub(crate) fn require(role: Role, needed: Role, operation: &'static str) -> Result<(), PromiseError> {
    if role != needed {
        return Err(PromiseError::WrongRole { operation, role });
    }
    Ok(())
}

pub(crate) fn surface<T: Clone>(outcome: &Outcome<T>) -> Result<T, PromiseError> {
    match outcome {
        Ok(value) => Ok(value.clone()),
        Err(err) => Err(PromiseError::Rejected(err.clone())),
    }
}

/// Run a user callback, logging instead of unwinding if it panics
pub(crate) fn guarded<F: FnOnce()>(callback: F) {
    if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        tracing::error!("promise callback panicked");
    }
}
