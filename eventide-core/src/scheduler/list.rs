//! Sorted-list backend.

use std::collections::VecDeque;

use super::EventOrder;
use crate::event::QueueEntry;

/// Keeps entries in ascending order. Insertion is O(n), popping the
/// earliest entry is O(1). Fastest for very small queues.
#[derive(Debug, Default)]
pub struct ListOrder {
    entries: VecDeque<QueueEntry>,
}

impl ListOrder {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventOrder for ListOrder {
    fn insert(&mut self, entry: QueueEntry) {
        let at = self.entries.partition_point(|existing| *existing < entry);
        self.entries.insert(at, entry);
    }

    fn peek(&self) -> Option<QueueEntry> {
        self.entries.front().copied()
    }

    fn pop(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    fn remove(&mut self, entry: QueueEntry) -> bool {
        match self.entries.binary_search(&entry) {
            Ok(at) => self.entries.remove(at).is_some(),
            Err(_) => false,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
