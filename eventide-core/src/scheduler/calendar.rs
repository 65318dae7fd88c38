//! Calendar-queue backend.
//!
//! Time is cut into buckets of `width` ticks laid out like the days of a
//! calendar year: an entry at tick `t` lands in bucket `(t / width) % n`.
//! Dequeue walks the year from the last bucket served and takes the first
//! bucket front that falls inside the current "day". When a whole year
//! passes without a hit the earliest front is found by direct search.
//!
//! ```text
//!   bucket:   0        1        2        3
//!           +------+ +------+ +------+ +------+
//!           | 8,12 | | 1    | | 2,10 | |      |     width = 1, n = 4
//!           +------+ +------+ +------+ +------+
//!                      ^ last_bucket, bucket_top = 2
//! ```
//!
//! The bucket count doubles when the queue holds more than two entries per
//! bucket and halves below one entry per two buckets. Each resize samples
//! the earliest entries to pick a new width.

use std::collections::VecDeque;

use super::EventOrder;
use crate::event::{EventKey, QueueEntry};
use crate::time::Time;

/// Number of leading entries sampled when choosing a new bucket width.
const WIDTH_SAMPLES: usize = 25;

/// Smallest bucket count the queue shrinks to.
const MIN_BUCKETS: usize = 2;

/// Calendar queue with amortized O(1) insert and dequeue for evenly spread
/// timestamps.
#[derive(Debug)]
pub struct CalendarOrder {
    buckets: Vec<VecDeque<QueueEntry>>,
    width: u64,
    last_bucket: usize,
    bucket_top: u64,
    last_key: EventKey,
    len: usize,
}

impl Default for CalendarOrder {
    fn default() -> Self {
        Self::with_buckets(MIN_BUCKETS)
    }
}

impl CalendarOrder {
    /// Creates an empty calendar with the minimum bucket count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty calendar with `buckets` initial buckets.
    pub fn with_buckets(buckets: usize) -> Self {
        let count = buckets.max(MIN_BUCKETS);
        Self {
            buckets: (0..count).map(|_| VecDeque::new()).collect(),
            width: 1,
            last_bucket: 0,
            bucket_top: 1,
            last_key: EventKey::new(Time::ZERO, 0),
            len: 0,
        }
    }

    /// Current number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Current bucket width in ticks.
    pub fn bucket_width(&self) -> u64 {
        self.width
    }

    fn tick_of(entry: &QueueEntry) -> u64 {
        entry.key.time.ticks().max(0) as u64
    }

    fn bucket_of(&self, tick: u64) -> usize {
        ((tick / self.width) % self.buckets.len() as u64) as usize
    }

    fn top_after(&self, tick: u64) -> u64 {
        (tick / self.width).saturating_add(1).saturating_mul(self.width)
    }

    /// Moves the scan position onto the bucket holding `tick`.
    fn reposition(&mut self, tick: u64) {
        self.last_bucket = self.bucket_of(tick);
        self.bucket_top = self.top_after(tick);
    }

    fn place(&mut self, entry: QueueEntry) {
        let bucket = self.bucket_of(Self::tick_of(&entry));
        let slot = &mut self.buckets[bucket];
        let at = slot.partition_point(|existing| *existing < entry);
        slot.insert(at, entry);
    }

    /// Locates the bucket holding the earliest entry and the year top the
    /// scan reached when it found it.
    fn locate_next(&self) -> Option<(usize, u64)> {
        if self.len == 0 {
            return None;
        }
        let count = self.buckets.len();
        let mut bucket = self.last_bucket;
        let mut top = self.bucket_top;
        for _ in 0..count {
            if let Some(front) = self.buckets[bucket].front()
                && Self::tick_of(front) < top
            {
                return Some((bucket, top));
            }
            bucket = (bucket + 1) % count;
            top = top.saturating_add(self.width);
        }

        // A full year without a hit: fall back to a direct search.
        let (bucket, front) = self
            .buckets
            .iter()
            .enumerate()
            .filter_map(|(index, entries)| entries.front().map(|front| (index, *front)))
            .min_by_key(|(_, front)| *front)?;
        Some((bucket, self.top_after(Self::tick_of(&front))))
    }

    fn resize(&mut self, count: usize) {
        let mut entries: Vec<QueueEntry> = self.buckets.iter_mut().flat_map(|b| b.drain(..)).collect();
        entries.sort_unstable();

        self.width = Self::sample_width(&entries);
        self.buckets = (0..count.max(MIN_BUCKETS)).map(|_| VecDeque::new()).collect();
        for entry in entries {
            self.place(entry);
        }
        let tick = self.last_key.time.ticks().max(0) as u64;
        self.reposition(tick);
    }

    /// Picks a width of about three times the mean gap between the earliest
    /// entries, ignoring gaps larger than twice the first mean.
    fn sample_width(sorted: &[QueueEntry]) -> u64 {
        let samples = sorted.len().min(WIDTH_SAMPLES);
        if samples < 2 {
            return 1;
        }
        let gaps: Vec<u64> = sorted[..samples]
            .windows(2)
            .map(|pair| Self::tick_of(&pair[1]).saturating_sub(Self::tick_of(&pair[0])))
            .collect();
        let mean = gaps.iter().sum::<u64>() / gaps.len() as u64;

        let close: Vec<u64> = gaps
            .iter()
            .copied()
            .filter(|gap| *gap <= mean.saturating_mul(2))
            .collect();
        if close.is_empty() {
            return 1;
        }
        let close_mean = close.iter().sum::<u64>() / close.len() as u64;
        close_mean.saturating_mul(3).max(1)
    }
}

impl EventOrder for CalendarOrder {
    fn insert(&mut self, entry: QueueEntry) {
        if entry.key < self.last_key {
            self.last_key = entry.key;
            self.reposition(Self::tick_of(&entry));
        }
        self.place(entry);
        self.len += 1;
        if self.len > self.buckets.len() * 2 {
            self.resize(self.buckets.len() * 2);
        }
    }

    fn peek(&self) -> Option<QueueEntry> {
        let (bucket, _) = self.locate_next()?;
        self.buckets[bucket].front().copied()
    }

    fn pop(&mut self) -> Option<QueueEntry> {
        let (bucket, top) = self.locate_next()?;
        let entry = self.buckets[bucket].pop_front()?;
        self.last_bucket = bucket;
        self.bucket_top = top;
        self.last_key = entry.key;
        self.len -= 1;
        if self.buckets.len() > MIN_BUCKETS && self.len < self.buckets.len() / 2 {
            self.resize(self.buckets.len() / 2);
        }
        Some(entry)
    }

    fn remove(&mut self, entry: QueueEntry) -> bool {
        let bucket = self.bucket_of(Self::tick_of(&entry));
        let slot = &mut self.buckets[bucket];
        match slot.binary_search(&entry) {
            Ok(at) => {
                slot.remove(at);
                self.len -= 1;
                true
            }
            Err(_) => false,
        }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn bucket_count(&self) -> Option<usize> {
        Some(self.buckets.len())
    }
}
