//! Bounded, lock-free multi-producer multi-consumer event queue.
//!
//! Built on `crossbeam_queue::ArrayQueue`, which provides the
//! acquire/release-ordered slot handoff a lock-free MPMC queue needs: a
//! consumer that observes a published event also observes every write
//! the producer made before publishing it.

use crate::error::{EmberlogError, Result};
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A point-in-time snapshot of ring buffer counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingBufferStats {
    pub published: u64,
    pub consumed: u64,
    pub buffer_full_events: u64,
    pub current_size: usize,
    pub capacity: usize,
}

/// A bounded MPMC queue of `T`, capacity fixed to a power of two.
pub struct RingBuffer<T> {
    queue: ArrayQueue<T>,
    capacity: usize,
    published: AtomicU64,
    consumed: AtomicU64,
    buffer_full_events: AtomicU64,
}

impl<T> RingBuffer<T> {
    /// Construct a buffer of the given capacity, which must be a
    /// non-zero power of two.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(EmberlogError::InvalidCapacity(capacity));
        }
        Ok(RingBuffer {
            queue: ArrayQueue::new(capacity),
            capacity,
            published: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            buffer_full_events: AtomicU64::new(0),
        })
    }

    /// Non-blocking publish. Returns `false` iff the buffer was full.
    pub fn try_publish(&self, item: T) -> bool {
        match self.queue.push(item) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.buffer_full_events.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Publish with a bounded wait: retries `try_publish` with a short
    /// yield/park backoff until it succeeds or `timeout` elapses.
    pub fn publish(&self, mut item: T, timeout: Duration) -> bool
    where
        T: Send,
    {
        let deadline = Instant::now() + timeout;
        loop {
            match self.queue.push(item) {
                Ok(()) => {
                    self.published.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                Err(rejected) => {
                    self.buffer_full_events.fetch_add(1, Ordering::Relaxed);
                    item = rejected;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::park_timeout(Duration::from_micros(50));
        }
    }

    /// Like [`RingBuffer::try_publish`], but hands the item back on
    /// failure instead of dropping it, so callers can act on it (e.g.
    /// evict-and-retry policies).
    pub fn try_publish_or_return(&self, item: T) -> std::result::Result<(), T> {
        match self.queue.push(item) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(rejected) => {
                self.buffer_full_events.fetch_add(1, Ordering::Relaxed);
                Err(rejected)
            }
        }
    }

    /// Remove and return the head-most item, if any.
    pub fn consume(&self) -> Option<T> {
        let item = self.queue.pop();
        if item.is_some() {
            self.consumed.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Drain up to `max` items into `out`, in publish order. Returns the
    /// number of items drained.
    pub fn consume_batch(&self, out: &mut Vec<T>, max: usize) -> usize {
        let mut count = 0;
        while count < max {
            match self.consume() {
                Some(item) => {
                    out.push(item);
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    pub fn size(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            published: self.published.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
            buffer_full_events: self.buffer_full_events.load(Ordering::Relaxed),
            current_size: self.size(),
            capacity: self.capacity,
        }
    }
}
