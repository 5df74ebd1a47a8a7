//! Correlation ID allocation with LIFO recycling

use crate::id::CorrelationId;

/// Hands out negative correlation IDs.
///
/// Freed IDs are reused most-recent-first before a new ID is minted, so a
/// long-lived proxy keeps its ID space compact.
#[derive(Debug)]
pub struct IdAllocator {
    next: i64,
    free: Vec<i64>,
}

impl IdAllocator {
    /// Create an allocator whose first ID is -1
    pub fn new() -> Self {
        Self {
            next: -1,
            free: Vec::new(),
        }
    }

    /// Take the next ID, preferring recycled ones
    pub fn allocate(&mut self) -> CorrelationId {
        if let Some(id) = self.free.pop() {
            return CorrelationId(id);
        }

        let id = self.next;
        self.next -= 1;
        CorrelationId(id)
    }

    /// Return an ID for reuse
    pub fn release(&mut self, id: CorrelationId) {
        debug_assert!(id.is_request(), "only request IDs are recycled");
        if id.is_request() && !self.free.contains(&id.0) {
            self.free.push(id.0);
        }
    }

    /// Number of IDs waiting to be reused
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of IDs minted so far
    pub fn minted(&self) -> usize {
        (-1 - self.next) as usize
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
