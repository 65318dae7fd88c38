//! Ordered storage of pending events.
//!
//! [`Scheduler`] pairs an arena that owns event records with a pluggable
//! ordering backend ([`EventOrder`]). Every backend must yield entries in
//! `(time, sequence)` ascending order, so the choice of backend never
//! changes dispatch order, only its cost.

mod arena;
mod calendar;
mod heap;
mod list;
mod map;

use std::fmt;
use std::str::FromStr;

use arena::EventArena;
pub use calendar::CalendarOrder;
pub use heap::HeapOrder;
pub use list::ListOrder;
pub use map::MapOrder;

use crate::config::SchedulerConfig;
use crate::event::{Event, EventId, QueueEntry};

/// Capability set every ordering backend provides.
///
/// Backends only see `(key, slot)` entries; the records themselves stay in
/// the scheduler's arena.
pub trait EventOrder: fmt::Debug {
    /// Adds an entry.
    fn insert(&mut self, entry: QueueEntry);

    /// Earliest entry, without removing it.
    fn peek(&self) -> Option<QueueEntry>;

    /// Removes and returns the earliest entry.
    fn pop(&mut self) -> Option<QueueEntry>;

    /// Removes a specific entry. Returns whether it was present.
    fn remove(&mut self, entry: QueueEntry) -> bool;

    /// Number of entries held.
    fn len(&self) -> usize;

    /// True when no entries are held.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bucket count for bucketed backends.
    fn bucket_count(&self) -> Option<usize> {
        None
    }
}

/// Available ordering backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SchedulerKind {
    /// Binary min-heap
    #[default]
    Heap,
    /// Ordered map
    Map,
    /// Calendar queue
    Calendar,
    /// Sorted list
    List,
}

impl SchedulerKind {
    /// All backends, in declaration order.
    pub const ALL: [SchedulerKind; 4] = [
        SchedulerKind::Heap,
        SchedulerKind::Map,
        SchedulerKind::Calendar,
        SchedulerKind::List,
    ];

    /// Instantiates an empty backend of this kind with default sizing.
    pub fn build(self) -> Box<dyn EventOrder> {
        self.build_with(&SchedulerConfig::default())
    }

    /// Instantiates an empty backend of this kind, sized by `config`.
    /// `config.kind` is ignored.
    pub fn build_with(self, config: &SchedulerConfig) -> Box<dyn EventOrder> {
        match self {
            SchedulerKind::Heap => Box::new(HeapOrder::new()),
            SchedulerKind::Map => Box::new(MapOrder::new()),
            SchedulerKind::Calendar => Box::new(CalendarOrder::with_buckets(config.calendar_buckets)),
            SchedulerKind::List => Box::new(ListOrder::new()),
        }
    }

    /// Lowercase name, as accepted by `FromStr`.
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerKind::Heap => "heap",
            SchedulerKind::Map => "map",
            SchedulerKind::Calendar => "calendar",
            SchedulerKind::List => "list",
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "heap" => Ok(SchedulerKind::Heap),
            "map" => Ok(SchedulerKind::Map),
            "calendar" => Ok(SchedulerKind::Calendar),
            "list" => Ok(SchedulerKind::List),
            _ => Err(format!("Invalid scheduler kind: {s}")),
        }
    }
}

/// Pending events ordered by `(time, sequence)`.
///
/// Cancellation is lazy: [`Scheduler::cancel`] only flags the record, and
/// the flagged event is still returned by [`Scheduler::remove_next`] so the
/// caller can skip it. [`Scheduler::remove`] reclaims a record eagerly.
pub struct Scheduler<C> {
    arena: EventArena<C>,
    order: Box<dyn EventOrder>,
    config: SchedulerConfig,
}

impl<C> Scheduler<C> {
    /// Creates an empty scheduler backed by `kind`.
    pub fn new(kind: SchedulerKind) -> Self {
        Self::from_config(&SchedulerConfig {
            kind,
            ..SchedulerConfig::default()
        })
    }

    /// Creates an empty scheduler as described by `config`. The sizing
    /// survives later backend swaps.
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            arena: EventArena::new(),
            order: config.kind.build_with(config),
            config: config.clone(),
        }
    }

    /// Backend currently in use.
    pub fn kind(&self) -> SchedulerKind {
        self.config.kind
    }

    /// Bucket count of the active backend, if it is bucketed.
    pub fn bucket_count(&self) -> Option<usize> {
        self.order.bucket_count()
    }

    /// Stores `event` and returns its handle.
    pub fn insert(&mut self, event: Event<C>) -> EventId {
        let key = event.key();
        let slot = self.arena.insert(event);
        self.order.insert(QueueEntry { key, slot });
        EventId::new(slot, key.sequence)
    }

    /// Earliest pending event, cancelled or not.
    pub fn peek_next(&self) -> Option<&Event<C>> {
        let entry = self.order.peek()?;
        self.arena.get(entry.slot, entry.key.sequence)
    }

    /// Removes and returns the earliest pending event with its handle.
    pub fn remove_next(&mut self) -> Option<(EventId, Event<C>)> {
        while let Some(entry) = self.order.pop() {
            if let Some(event) = self.arena.take(entry.slot, entry.key.sequence) {
                return Some((EventId::new(entry.slot, entry.key.sequence), event));
            }
        }
        None
    }

    /// Removes a specific live event. Stale handles yield `None`.
    pub fn remove(&mut self, id: EventId) -> Option<Event<C>> {
        let key = self.arena.get(id.slot(), id.sequence())?.key();
        self.order.remove(QueueEntry {
            key,
            slot: id.slot(),
        });
        self.arena.take(id.slot(), id.sequence())
    }

    /// Flags a live event as cancelled. Returns `false` for stale handles
    /// and events that were already cancelled.
    pub fn cancel(&mut self, id: EventId) -> bool {
        match self.arena.get_mut(id.slot(), id.sequence()) {
            Some(event) if !event.is_cancelled() => {
                event.cancel();
                true
            }
            _ => false,
        }
    }

    /// Looks up a live event.
    pub fn get(&self, id: EventId) -> Option<&Event<C>> {
        self.arena.get(id.slot(), id.sequence())
    }

    /// True if `id` names an event that is stored and not cancelled.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.get(id).is_some_and(|event| !event.is_cancelled())
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of stored events, cancelled ones included.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Swaps the ordering backend, migrating every stored entry.
    pub fn set_kind(&mut self, kind: SchedulerKind) {
        let mut next = kind.build_with(&self.config);
        while let Some(entry) = self.order.pop() {
            next.insert(entry);
        }
        self.order = next;
        self.config.kind = kind;
    }

    /// Drops every stored event.
    pub fn clear(&mut self) {
        while self.order.pop().is_some() {}
        self.arena.clear();
    }
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new(SchedulerKind::default())
    }
}

impl<C> fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("kind", &self.config.kind)
            .field("buckets", &self.order.bucket_count())
            .field("len", &self.len())
            .finish()
    }
}
