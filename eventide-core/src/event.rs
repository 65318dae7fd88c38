//! Event records, handles and logical contexts.
//!
//! An [`Event`] is owned by the scheduler for its whole life. Callers only
//! ever hold an [`EventId`]: a `(slot, sequence)` pair that names a storage
//! slot and the insertion that filled it. When the slot is emptied or
//! reused the sequence no longer matches and the handle goes stale, so late
//! cancellation can never touch the wrong event.

use std::cmp::Ordering;
use std::fmt;

use crate::time::Time;

/// Slot value reserved for destroy-events, which live outside the queue.
pub(crate) const DESTROY_SLOT: u32 = u32::MAX;

/// Logical entity (for example a simulated node) an event runs on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContextId(u32);

impl ContextId {
    /// Context of code running outside any event.
    pub const NONE: ContextId = ContextId(u32::MAX);

    /// Wraps a raw context number.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        ContextId(raw)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// True for [`ContextId::NONE`].
    #[inline]
    pub fn is_none(self) -> bool {
        self == ContextId::NONE
    }
}

impl Default for ContextId {
    fn default() -> Self {
        ContextId::NONE
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("ctx:none")
        } else {
            write!(f, "ctx:{}", self.0)
        }
    }
}

/// Non-owning handle to a scheduled event.
///
/// The default handle refers to nothing and is always expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventId {
    slot: u32,
    sequence: u64,
}

impl EventId {
    #[inline]
    pub(crate) const fn new(slot: u32, sequence: u64) -> Self {
        EventId { slot, sequence }
    }

    #[inline]
    pub(crate) fn slot(self) -> u32 {
        self.slot
    }

    /// Insertion sequence number this handle was issued for.
    #[inline]
    pub fn sequence(self) -> u64 {
        self.sequence
    }

    /// True for handles that were never issued by a simulator.
    #[inline]
    pub fn is_detached(self) -> bool {
        self.sequence == 0
    }

    /// True if the handle names a destroy-event rather than a queued one.
    #[inline]
    pub fn is_destroy(self) -> bool {
        !self.is_detached() && self.slot == DESTROY_SLOT
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_destroy() {
            write!(f, "E#{}@destroy", self.sequence)
        } else {
            write!(f, "E#{}@{}", self.sequence, self.slot)
        }
    }
}

/// Strictly increasing sequence source shared by queued and destroy events.
///
/// Starts at 1 so that sequence 0 stays reserved for detached handles.
#[derive(Debug, Clone)]
pub struct SequenceGen {
    next: u64,
}

impl SequenceGen {
    /// Creates a generator whose first sequence is 1.
    pub fn new() -> Self {
        SequenceGen { next: 1 }
    }

    /// Mints the next sequence number.
    pub fn next_sequence(&mut self) -> u64 {
        let sequence = self.next;
        self.next += 1;
        sequence
    }

    /// Peeks at the next sequence without consuming it.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for SequenceGen {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordering key of a pending event: `(time, sequence)` ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    /// Absolute firing time
    pub time: Time,
    /// Insertion sequence, breaking ties in FIFO order
    pub sequence: u64,
}

impl EventKey {
    /// Builds a key.
    pub fn new(time: Time, sequence: u64) -> Self {
        EventKey { time, sequence }
    }
}

/// A unit of deferred work held by the scheduler.
pub struct Event<C> {
    key: EventKey,
    context: ContextId,
    callback: C,
    cancelled: bool,
}

impl<C> Event<C> {
    /// Creates a live event.
    pub fn new(time: Time, sequence: u64, context: ContextId, callback: C) -> Self {
        Event {
            key: EventKey::new(time, sequence),
            context,
            callback,
            cancelled: false,
        }
    }

    /// Ordering key.
    #[inline]
    pub fn key(&self) -> EventKey {
        self.key
    }

    /// Absolute firing time.
    #[inline]
    pub fn time(&self) -> Time {
        self.key.time
    }

    /// Insertion sequence.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.key.sequence
    }

    /// Context the callback runs under.
    #[inline]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Borrow the callback.
    pub fn callback(&self) -> &C {
        &self.callback
    }

    /// Whether the event was cancelled and must not be invoked.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub(crate) fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Consumes the event, yielding its callback.
    pub fn into_callback(self) -> C {
        self.callback
    }
}

impl<C> fmt::Debug for Event<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("time", &self.key.time)
            .field("sequence", &self.key.sequence)
            .field("context", &self.context)
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}

/// Position of an event inside a backend: key plus the arena slot holding
/// the record. Backends order entries by key alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueEntry {
    /// Ordering key
    pub key: EventKey,
    /// Arena slot of the record
    pub slot: u32,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.slot.cmp(&other.slot))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Snapshot of an event about to run, handed to pre-event hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventInfo {
    /// Handle of the running event
    pub id: EventId,
    /// Its firing time, equal to the simulator's `now()`
    pub time: Time,
    /// Context it runs under
    pub context: ContextId,
}
