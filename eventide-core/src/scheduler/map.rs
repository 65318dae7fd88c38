//! Sorted-map backend.

use std::collections::BTreeSet;

use super::EventOrder;
use crate::event::QueueEntry;

/// Ordered set keyed by `(time, sequence)`; every operation is O(log n),
/// including arbitrary removal.
#[derive(Debug, Default)]
pub struct MapOrder {
    entries: BTreeSet<QueueEntry>,
}

impl MapOrder {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventOrder for MapOrder {
    fn insert(&mut self, entry: QueueEntry) {
        self.entries.insert(entry);
    }

    fn peek(&self) -> Option<QueueEntry> {
        self.entries.first().copied()
    }

    fn pop(&mut self) -> Option<QueueEntry> {
        self.entries.pop_first()
    }

    fn remove(&mut self, entry: QueueEntry) -> bool {
        self.entries.remove(&entry)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
