//! Local callables the host refers to by ID

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use st_protocol::{CallbackId, Value};

/// A callable invoked when the host sends a notification
pub type Callback = Arc<dyn Fn(Value) + Send + Sync>;

pub(crate) struct CallbackTable {
    next: AtomicU32,
    entries: DashMap<CallbackId, Callback>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
            entries: DashMap::new(),
        }
    }

    pub fn register<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let id = CallbackId(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries.insert(id, Arc::new(callback));
        id
    }

    pub fn remove(&self, id: CallbackId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: CallbackId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Run the callback for `id`; returns false if none is registered
    pub fn invoke(&self, id: CallbackId, value: Value) -> bool {
        // Clone out so the map is not locked while user code runs
        let Some(callback) = self.entries.get(&id).map(|entry| Arc::clone(entry.value())) else {
            tracing::debug!(callback = %id, "notification for unknown callback");
            return false;
        };

        if panic::catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
            tracing::error!(callback = %id, "callback panicked");
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
