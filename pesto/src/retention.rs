//! Bounded retention for unpinned history.
//!
//! Pinned entries are never counted against the cap and never evicted, so the
//! store holds at most `max_items` unpinned entries plus every pinned one.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    max_items: usize,
}

impl RetentionPolicy {
    pub fn new(max_items: usize) -> Self {
        Self { max_items }
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// How many of the oldest unpinned entries must go
    pub fn excess(&self, unpinned: usize) -> usize {
        unpinned.saturating_sub(self.max_items)
    }
}
