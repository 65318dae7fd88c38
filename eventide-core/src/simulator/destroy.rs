//! Teardown callbacks run once by `Simulator::destroy`.

use std::collections::VecDeque;

use super::Callback;

struct DestroyEntry {
    sequence: u64,
    callback: Callback,
    cancelled: bool,
}

/// FIFO of destroy-events, outside the time-ordered queue.
#[derive(Default)]
pub(crate) struct DestroyList {
    entries: VecDeque<DestroyEntry>,
}

impl DestroyList {
    pub(crate) fn push(&mut self, sequence: u64, callback: Callback) {
        self.entries.push_back(DestroyEntry {
            sequence,
            callback,
            cancelled: false,
        });
    }

    fn find_mut(&mut self, sequence: u64) -> Option<&mut DestroyEntry> {
        self.entries.iter_mut().find(|entry| entry.sequence == sequence)
    }

    /// Flags the entry so it is skipped. Returns `false` if it was absent or
    /// already cancelled.
    pub(crate) fn cancel(&mut self, sequence: u64) -> bool {
        match self.find_mut(sequence) {
            Some(entry) if !entry.cancelled => {
                entry.cancelled = true;
                true
            }
            _ => false,
        }
    }

    /// Drops the entry outright.
    pub(crate) fn remove(&mut self, sequence: u64) -> bool {
        match self.entries.iter().position(|entry| entry.sequence == sequence) {
            Some(index) => self.entries.remove(index).is_some(),
            None => false,
        }
    }

    pub(crate) fn is_pending(&self, sequence: u64) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.sequence == sequence && !entry.cancelled)
    }

    /// Next callback to run, skipping cancelled entries.
    pub(crate) fn pop_live(&mut self) -> Option<(u64, Callback)> {
        while let Some(entry) = self.entries.pop_front() {
            if !entry.cancelled {
                return Some((entry.sequence, entry.callback));
            }
        }
        None
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback {
        Box::new(|_| {})
    }

    #[test]
    fn test_pop_live_is_fifo_and_skips_cancelled() {
        let mut list = DestroyList::default();
        list.push(1, noop());
        list.push(2, noop());
        list.push(3, noop());

        assert!(list.cancel(2));
        assert!(!list.cancel(2));
        assert!(!list.is_pending(2));

        let order: Vec<u64> = std::iter::from_fn(|| list.pop_live().map(|(seq, _)| seq)).collect();
        assert_eq!(order, [1, 3]);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_remove_unknown_sequence() {
        let mut list = DestroyList::default();
        list.push(7, noop());
        assert!(!list.remove(8));
        assert!(list.remove(7));
        assert!(!list.is_pending(7));
    }
}
