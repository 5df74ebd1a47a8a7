//! Outstanding requests keyed by correlation ID

use std::collections::HashMap;

use st_core::ThreadPromise;
use st_protocol::{CorrelationId, IdAllocator, Value};

/// Peer handles of every request still waiting for its response.
///
/// IDs go back to the allocator the moment their response is taken, so a
/// recycled ID never collides with one still in flight.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    ids: IdAllocator,
    waiting: HashMap<CorrelationId, ThreadPromise<Value>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an ID and keep the peer side; the caller gets the owner
    pub fn register(&mut self) -> (CorrelationId, ThreadPromise<Value>) {
        let id = self.ids.allocate();
        let owner = ThreadPromise::new();
        self.waiting.insert(id, owner.peer());
        (id, owner)
    }

    /// Remove the entry for a response and recycle its ID
    pub fn take(&mut self, id: CorrelationId) -> Option<ThreadPromise<Value>> {
        let peer = self.waiting.remove(&id)?;
        self.ids.release(id);
        Some(peer)
    }

    /// Forget a request that never reached the wire
    pub fn discard(&mut self, id: CorrelationId) {
        self.take(id);
    }

    /// Remove every entry, recycling all IDs
    pub fn drain(&mut self) -> Vec<ThreadPromise<Value>> {
        let ids: Vec<_> = self.waiting.keys().copied().collect();
        ids.into_iter().filter_map(|id| self.take(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn minted(&self) -> usize {
        self.ids.minted()
    }
}
