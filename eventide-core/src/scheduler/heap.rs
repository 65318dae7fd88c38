//! Binary min-heap backend.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::EventOrder;
use crate::event::QueueEntry;

/// `BinaryHeap` wrapped in `Reverse` so the smallest `(time, sequence)` pops
/// first. Removing an arbitrary entry rebuilds the heap in O(n); the
/// simulator only needs that for eager removal.
#[derive(Debug, Default)]
pub struct HeapOrder {
    heap: BinaryHeap<Reverse<QueueEntry>>,
}

impl HeapOrder {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventOrder for HeapOrder {
    fn insert(&mut self, entry: QueueEntry) {
        self.heap.push(Reverse(entry));
    }

    fn peek(&self) -> Option<QueueEntry> {
        self.heap.peek().map(|Reverse(entry)| *entry)
    }

    fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop().map(|Reverse(entry)| entry)
    }

    fn remove(&mut self, entry: QueueEntry) -> bool {
        let before = self.heap.len();
        self.heap.retain(|Reverse(candidate)| *candidate != entry);
        self.heap.len() != before
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}
