//! Asynchronous dispatch from the ring buffer to a logger's sinks.
//!
//! A single worker thread drains the ring buffer in batches and fans
//! each event out to every attached sink. The producer side never blocks
//! on sink I/O; it only ever blocks (briefly, per [`OverflowStrategy`])
//! on ring buffer capacity.

use crate::diagnostic;
use crate::error::{EmberlogError, Result};
use crate::event::Event;
use crate::ring_buffer::RingBuffer;
use crate::sink::Sink;
use arc_swap::ArcSwap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const WORKER_BATCH_SIZE: usize = 256;
const WORKER_IDLE_PARK: Duration = Duration::from_micros(1);
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// What a producer does when the ring buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowStrategy {
    /// Block the caller (bounded) until space frees up.
    Block,
    /// Drop the oldest buffered event to make room for the new one.
    DropOldest,
    /// Drop the new event and keep what's already buffered.
    DropNewest,
    /// Bypass the ring buffer and write directly to the sinks on the
    /// caller's thread.
    SynchronousWrite,
    /// Drop the new event silently; identical to `DropNewest` except it
    /// does not attempt to publish at all.
    Discard,
}

impl FromStr for OverflowStrategy {
    type Err = EmberlogError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BLOCK" => Ok(OverflowStrategy::Block),
            "DROP_OLDEST" => Ok(OverflowStrategy::DropOldest),
            "DROP_NEWEST" => Ok(OverflowStrategy::DropNewest),
            "SYNCHRONOUS_WRITE" => Ok(OverflowStrategy::SynchronousWrite),
            "DISCARD" => Ok(OverflowStrategy::Discard),
            other => Err(EmberlogError::InvalidOverflowStrategy(other.to_string())),
        }
    }
}

/// A snapshot of dispatcher-level counters, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherStats {
    pub published: u64,
    pub processed: u64,
    pub dropped: u64,
    pub overflow_events: u64,
    pub pending: usize,
}

impl DispatcherStats {
    pub fn drop_rate(&self) -> f64 {
        let attempted = self.published + self.dropped;
        if attempted == 0 {
            0.0
        } else {
            self.dropped as f64 / attempted as f64
        }
    }

    pub fn buffer_utilization(&self, capacity: usize) -> f64 {
        if capacity == 0 {
            0.0
        } else {
            self.pending as f64 / capacity as f64
        }
    }
}

/// Owns the ring buffer and the worker thread draining it into `sinks`.
pub struct AsyncDispatcher {
    buffer: Arc<RingBuffer<Event>>,
    sinks: Arc<ArcSwap<Vec<Arc<dyn Sink>>>>,
    overflow: OverflowStrategy,
    block_timeout: Duration,
    running: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl AsyncDispatcher {
    pub fn new(
        capacity: usize,
        overflow: OverflowStrategy,
        block_timeout: Duration,
        sinks: Arc<ArcSwap<Vec<Arc<dyn Sink>>>>,
    ) -> Result<Self> {
        let buffer = Arc::new(RingBuffer::new(capacity)?);
        let running = Arc::new(AtomicBool::new(true));
        let processed = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));

        let worker = spawn_worker(Arc::clone(&buffer), Arc::clone(&sinks), Arc::clone(&running), Arc::clone(&processed));

        Ok(AsyncDispatcher {
            buffer,
            sinks,
            overflow,
            block_timeout,
            running,
            processed,
            dropped,
            worker: parking_lot::Mutex::new(Some(worker)),
        })
    }

    /// Submit an event per the configured overflow strategy. Never
    /// returns an error: an event that cannot be placed is dropped (or,
    /// for `SynchronousWrite`, written inline) and counted.
    pub fn submit(&self, event: Event) {
        match self.overflow {
            OverflowStrategy::Block => {
                if !self.buffer.publish(event, self.block_timeout) {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            OverflowStrategy::DropNewest => {
                if !self.buffer.try_publish(event) {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            OverflowStrategy::DropOldest => {
                if let Err(rejected) = self.buffer.try_publish_or_return(event) {
                    let _ = self.buffer.consume();
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    // One slot is now free; a concurrent producer may have
                    // already taken it; either way this is the only retry.
                    let _ = self.buffer.try_publish(rejected);
                }
            }
            OverflowStrategy::SynchronousWrite => {
                if !self.buffer.try_publish(event.clone()) {
                    fan_out(&self.sinks.load(), &event);
                    self.processed.fetch_add(1, Ordering::Relaxed);
                }
            }
            OverflowStrategy::Discard => {
                if !self.buffer.try_publish(event) {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Blocks until the ring buffer is empty or `timeout` elapses.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while !self.buffer.is_empty() {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn stats(&self) -> DispatcherStats {
        let ring_stats = self.buffer.stats();
        DispatcherStats {
            published: ring_stats.published,
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            overflow_events: ring_stats.buffer_full_events,
            pending: ring_stats.current_size,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the worker, waiting up to [`SHUTDOWN_JOIN_TIMEOUT`] for it to
    /// drain and join. If the worker has not finished by the deadline the
    /// handle is dropped rather than joined - std Rust has no way to force
    /// a thread to stop, so an overrun is diagnosed and the thread is left
    /// to finish on its own. Idempotent.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            if let Some(handle) = self.worker.lock().take() {
                let deadline = std::time::Instant::now() + SHUTDOWN_JOIN_TIMEOUT;
                while !handle.is_finished() && std::time::Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(5));
                }
                if handle.is_finished() {
                    let _ = handle.join();
                } else {
                    diagnostic::report(
                        "AsyncDispatcher",
                        format!("worker did not exit within {SHUTDOWN_JOIN_TIMEOUT:?}; detaching"),
                    );
                }
            }
        }
    }
}

impl Drop for AsyncDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn fan_out(sinks: &[Arc<dyn Sink>], event: &Event) {
    for sink in sinks {
        sink.append(event);
    }
}

fn spawn_worker(
    buffer: Arc<RingBuffer<Event>>,
    sinks: Arc<ArcSwap<Vec<Arc<dyn Sink>>>>,
    running: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut batch = Vec::with_capacity(WORKER_BATCH_SIZE);
        loop {
            let drained = buffer.consume_batch(&mut batch, WORKER_BATCH_SIZE);
            if drained == 0 {
                if !running.load(Ordering::Acquire) && buffer.is_empty() {
                    break;
                }
                std::thread::park_timeout(WORKER_IDLE_PARK);
                continue;
            }
            let sink_list = sinks.load();
            for event in batch.drain(..) {
                fan_out(&sink_list, &event);
                processed.fetch_add(1, Ordering::Relaxed);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::PatternLayout;
    use crate::level::Level;
    use crate::sink::{ConsoleSink, ConsoleTarget};

    #[test]
    fn overflow_strategy_parses_known_names() {
        assert_eq!(OverflowStrategy::from_str("BLOCK").unwrap(), OverflowStrategy::Block);
        assert_eq!(OverflowStrategy::from_str("drop_oldest").unwrap(), OverflowStrategy::DropOldest);
        assert!(OverflowStrategy::from_str("nonsense").is_err());
    }

    #[test]
    fn dispatcher_delivers_events_to_sinks() {
        let sink = Arc::new(ConsoleSink::new("console", ConsoleTarget::Stdout));
        sink.set_layout(Arc::new(PatternLayout::new("%message%n")));
        let sinks: Arc<ArcSwap<Vec<Arc<dyn Sink>>>> = Arc::new(ArcSwap::from_pointee(vec![sink.clone()]));

        let dispatcher = AsyncDispatcher::new(16, OverflowStrategy::Block, Duration::from_secs(1), sinks).unwrap();
        for i in 0..10 {
            dispatcher.submit(Event::builder("app", Level::Info).message(format!("{i}")).build());
        }
        assert!(dispatcher.flush(Duration::from_secs(2)));
        dispatcher.shutdown();
        assert_eq!(dispatcher.stats().processed, 10);
    }

    #[test]
    fn discard_strategy_counts_drops_under_pressure() {
        let sinks: Arc<ArcSwap<Vec<Arc<dyn Sink>>>> = Arc::new(ArcSwap::from_pointee(Vec::new()));
        let dispatcher = AsyncDispatcher::new(2, OverflowStrategy::Discard, Duration::from_millis(10), sinks).unwrap();
        for i in 0..200 {
            dispatcher.submit(Event::builder("app", Level::Info).message(format!("{i}")).build());
        }
        dispatcher.shutdown();
        let stats = dispatcher.stats();
        assert!(stats.dropped > 0);
    }
}
