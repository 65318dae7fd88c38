//! Slot storage for event records.

use crate::event::Event;

/// Owns every pending event. Slots are recycled through a free list; a
/// record is only reachable with the sequence it was stored under.
pub(crate) struct EventArena<C> {
    slots: Vec<Option<Event<C>>>,
    free: Vec<u32>,
    live: usize,
}

impl<C> EventArena<C> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Stores `event` and returns its slot.
    pub(crate) fn insert(&mut self, event: Event<C>) -> u32 {
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(event);
            return slot;
        }
        let slot = self.slots.len() as u32;
        self.slots.push(Some(event));
        slot
    }

    pub(crate) fn get(&self, slot: u32, sequence: u64) -> Option<&Event<C>> {
        self.slots
            .get(slot as usize)?
            .as_ref()
            .filter(|event| event.sequence() == sequence)
    }

    pub(crate) fn get_mut(&mut self, slot: u32, sequence: u64) -> Option<&mut Event<C>> {
        self.slots
            .get_mut(slot as usize)?
            .as_mut()
            .filter(|event| event.sequence() == sequence)
    }

    /// Removes the record in `slot` if it still carries `sequence`.
    pub(crate) fn take(&mut self, slot: u32, sequence: u64) -> Option<Event<C>> {
        let cell = self.slots.get_mut(slot as usize)?;
        if cell.as_ref()?.sequence() != sequence {
            return None;
        }
        let event = cell.take()?;
        self.free.push(slot);
        self.live -= 1;
        Some(event)
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ContextId;
    use crate::time::Time;

    fn event(sequence: u64) -> Event<&'static str> {
        Event::new(Time::ZERO, sequence, ContextId::NONE, "cb")
    }

    #[test]
    fn test_slot_reuse_invalidates_old_sequence() {
        let mut arena = EventArena::new();
        let slot = arena.insert(event(1));
        assert!(arena.take(slot, 1).is_some());

        let reused = arena.insert(event(2));
        assert_eq!(slot, reused);
        assert!(arena.get(slot, 1).is_none());
        assert!(arena.get(slot, 2).is_some());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_take_with_wrong_sequence_keeps_record() {
        let mut arena = EventArena::new();
        let slot = arena.insert(event(5));
        assert!(arena.take(slot, 4).is_none());
        assert_eq!(arena.len(), 1);
        assert!(arena.take(99, 5).is_none());
    }
}
