//! Buffers formatted events in memory and flushes them to a file as a
//! single write, either once the batch fills up or once the oldest
//! buffered event has waited long enough.

use super::{ClosedFlag, LevelCell, Sink};
use crate::diagnostic;
use crate::error::Result;
use crate::event::Event;
use crate::layout::{Layout, PatternLayout};
use crate::level::Level;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_BATCH_TIME: Duration = Duration::from_millis(100);

struct Inner {
    file: Mutex<File>,
    buffer: Mutex<VecDeque<Vec<u8>>>,
    oldest_enqueued: Mutex<Option<Instant>>,
    batch_size: usize,
    batch_time: Duration,
    running: AtomicBool,
    messages_failed: AtomicU64,
}

impl Inner {
    fn push(&self, bytes: Vec<u8>) -> bool {
        let mut buffer = self.buffer.lock();
        buffer.push_back(bytes);
        let mut oldest = self.oldest_enqueued.lock();
        if oldest.is_none() {
            *oldest = Some(Instant::now());
        }
        buffer.len() >= self.batch_size
    }

    fn should_flush_on_age(&self) -> bool {
        match *self.oldest_enqueued.lock() {
            Some(enqueued_at) => enqueued_at.elapsed() >= self.batch_time,
            None => false,
        }
    }

    fn flush_now(&self, component: &str) {
        let drained: Vec<Vec<u8>> = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return;
            }
            let drained = buffer.drain(..).collect();
            *self.oldest_enqueued.lock() = None;
            drained
        };

        let mut file = self.file.lock();
        for bytes in &drained {
            if let Err(e) = file.write_all(bytes) {
                self.messages_failed.fetch_add(1, Ordering::Relaxed);
                diagnostic::report(component, e);
                return;
            }
        }
        let _ = file.flush();
    }
}

/// File sink that batches writes instead of issuing one syscall per
/// event. A background thread enforces the time-based flush trigger;
/// the size-based trigger fires inline on the producer that fills the
/// batch.
pub struct BatchingFileSink {
    name: String,
    layout: Mutex<Arc<dyn Layout>>,
    level: LevelCell,
    closed: ClosedFlag,
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BatchingFileSink {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, batch_size: usize) -> Result<Self> {
        Self::with_batch_time(name, path, batch_size, DEFAULT_BATCH_TIME)
    }

    pub fn with_batch_time(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        batch_size: usize,
        batch_time: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let inner = Arc::new(Inner {
            file: Mutex::new(file),
            buffer: Mutex::new(VecDeque::new()),
            oldest_enqueued: Mutex::new(None),
            batch_size: batch_size.max(1),
            batch_time,
            running: AtomicBool::new(true),
            messages_failed: AtomicU64::new(0),
        });

        let worker_inner = Arc::clone(&inner);
        let worker_name = name.clone();
        let handle = std::thread::spawn(move || {
            while worker_inner.running.load(Ordering::Acquire) {
                std::thread::sleep(DEFAULT_FLUSH_INTERVAL);
                if worker_inner.should_flush_on_age() {
                    worker_inner.flush_now(&worker_name);
                }
            }
        });

        Ok(BatchingFileSink {
            name,
            layout: Mutex::new(Arc::new(PatternLayout::new("%date [%level] %logger - %message%n"))),
            level: LevelCell::new(Level::All),
            closed: ClosedFlag::new(),
            inner,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn messages_failed_count(&self) -> u64 {
        self.inner.messages_failed.load(Ordering::Relaxed)
    }
}

impl Sink for BatchingFileSink {
    fn append(&self, event: &Event) {
        if self.closed.get() || !self.is_level_enabled(event.level) {
            return;
        }
        let layout = self.layout.lock().clone();
        let mut bytes = layout.format(event);
        super::append_throwable_if_needed(&*layout, event, &mut bytes);
        if self.inner.push(bytes) {
            self.inner.flush_now(&self.name);
        }
    }

    fn set_layout(&self, layout: Arc<dyn Layout>) {
        *self.layout.lock() = layout;
    }

    fn layout(&self) -> Arc<dyn Layout> {
        Arc::clone(&self.layout.lock())
    }

    fn set_level(&self, level: Level) {
        self.level.set(level);
    }

    fn level(&self) -> Level {
        self.level.get()
    }

    fn close(&self) {
        if self.closed.close() {
            self.inner.running.store(false, Ordering::Release);
            // Drain whatever remains, retrying briefly in case a writer
            // is mid-flush on another thread.
            for _ in 0..3 {
                self.inner.flush_now(&self.name);
                if self.inner.buffer.lock().is_empty() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            if let Some(handle) = self.worker.lock().take() {
                let _ = handle.join();
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn messages_failed(&self) -> u64 {
        self.messages_failed_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    #[test]
    fn flushes_on_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.log");
        let sink = BatchingFileSink::with_batch_time("batch", &path, 3, Duration::from_secs(60)).unwrap();
        sink.set_layout(Arc::new(PatternLayout::new("%message%n")));

        sink.append(&Event::builder("app", Level::Info).message("a").build());
        sink.append(&Event::builder("app", Level::Info).message("b").build());
        assert!(std::fs::read_to_string(&path).unwrap().is_empty());

        sink.append(&Event::builder("app", Level::Info).message("c").build());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "a\nb\nc\n");
    }

    #[test]
    fn flushes_on_age_via_background_thread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.log");
        let sink = BatchingFileSink::with_batch_time("batch", &path, 1000, Duration::from_millis(20)).unwrap();
        sink.set_layout(Arc::new(PatternLayout::new("%message%n")));

        sink.append(&Event::builder("app", Level::Info).message("only-one").build());
        std::thread::sleep(Duration::from_millis(150));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "only-one\n");
    }

    #[test]
    fn close_drains_remaining_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.log");
        let sink = BatchingFileSink::with_batch_time("batch", &path, 1000, Duration::from_secs(60)).unwrap();
        sink.set_layout(Arc::new(PatternLayout::new("%message%n")));
        sink.append(&Event::builder("app", Level::Info).message("leftover").build());
        sink.close();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "leftover\n");
    }
}
