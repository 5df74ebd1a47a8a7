//! Identifier types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pairs an asynchronous request with its response.
///
/// Requests use negative IDs, `0` is the termination notice and positive IDs
/// carry callback notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(pub i64);

impl CorrelationId {
    /// Reserved ID announcing that the owning process is terminating
    pub const SHUTDOWN: CorrelationId = CorrelationId(0);

    /// Create a new correlation ID
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Whether this is the termination notice
    pub fn is_shutdown(&self) -> bool {
        self.0 == 0
    }

    /// Whether this ID was minted for a request
    pub fn is_request(&self) -> bool {
        self.0 < 0
    }

    /// The callback this ID notifies, if it is a notification
    pub fn as_callback(&self) -> Option<CallbackId> {
        u32::try_from(self.0)
            .ok()
            .filter(|id| *id > 0)
            .map(CallbackId)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<CallbackId> for CorrelationId {
    fn from(id: CallbackId) -> Self {
        Self(i64::from(id.0))
    }
}

/// Identifier of a widget living inside the remote terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WidgetId(pub u64);

impl WidgetId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "widget-{}", self.0)
    }
}

impl From<u64> for WidgetId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Identifier of a callable registered on the controlling side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallbackId(pub u32);

impl CallbackId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback-{}", self.0)
    }
}
