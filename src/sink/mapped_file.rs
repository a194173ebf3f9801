//! Memory-mapped file sink: events are copied directly into a mapped
//! region instead of going through a buffered writer, trading syscall
//! overhead for page-fault and msync cost. The map grows by re-mapping
//! a larger file when it fills, and `close()` truncates the backing
//! file down to the exact number of bytes actually written.

use super::{ClosedFlag, LevelCell, Sink};
use crate::diagnostic;
use crate::error::Result;
use crate::event::Event;
use crate::layout::{Layout, PatternLayout};
use crate::level::Level;
use memmap2::MmapMut;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_INITIAL_CAPACITY: u64 = 64 * 1024;
const DEFAULT_FORCE_INTERVAL: Duration = Duration::from_millis(250);

struct MappedState {
    file: File,
    mmap: Option<MmapMut>,
    capacity: u64,
    write_offset: u64,
    last_force: Instant,
}

pub struct MappedFileSink {
    name: String,
    layout: Mutex<Arc<dyn Layout>>,
    level: LevelCell,
    closed: ClosedFlag,
    state: Mutex<MappedState>,
    force_on_each_write: bool,
    force_interval: Duration,
    remap_count: AtomicU64,
    messages_failed: AtomicU64,
}

impl MappedFileSink {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, force_on_each_write: bool) -> Result<Self> {
        Self::with_force_interval(name, path, force_on_each_write, DEFAULT_FORCE_INTERVAL)
    }

    pub fn with_force_interval(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        force_on_each_write: bool,
        force_interval: Duration,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        let existing_len = file.metadata()?.len();
        let capacity = existing_len.max(DEFAULT_INITIAL_CAPACITY);
        file.set_len(capacity)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(MappedFileSink {
            name: name.into(),
            layout: Mutex::new(Arc::new(PatternLayout::new("%date [%level] %logger - %message%n"))),
            level: LevelCell::new(Level::All),
            closed: ClosedFlag::new(),
            state: Mutex::new(MappedState {
                file,
                mmap: Some(mmap),
                capacity,
                write_offset: existing_len,
                last_force: Instant::now(),
            }),
            force_on_each_write,
            force_interval,
            remap_count: AtomicU64::new(0),
            messages_failed: AtomicU64::new(0),
        })
    }

    pub fn remap_count(&self) -> u64 {
        self.remap_count.load(Ordering::Relaxed)
    }

    pub fn messages_failed_count(&self) -> u64 {
        self.messages_failed.load(Ordering::Relaxed)
    }

    fn grow(&self, state: &mut MappedState, needed_additional: u64) -> std::io::Result<()> {
        // Drop the current map before resizing the file; mmap2 requires
        // no live mapping survive a remap on some platforms.
        state.mmap = None;

        let mut new_capacity = state.capacity.max(DEFAULT_INITIAL_CAPACITY);
        while new_capacity < state.write_offset + needed_additional {
            new_capacity *= 2;
        }

        state.file.set_len(new_capacity)?;
        let mmap = unsafe { MmapMut::map_mut(&state.file)? };
        state.mmap = Some(mmap);
        state.capacity = new_capacity;
        self.remap_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_record(&self, state: &mut MappedState, bytes: &[u8]) -> std::io::Result<()> {
        let needed = bytes.len() as u64;
        if state.write_offset + needed > state.capacity {
            self.grow(state, needed)?;
        }

        let start = state.write_offset as usize;
        let end = start + bytes.len();
        let mmap = state.mmap.as_mut().expect("mmap present after grow");
        mmap[start..end].copy_from_slice(bytes);
        state.write_offset += needed;

        if self.force_on_each_write {
            mmap.flush_range(start, bytes.len())?;
            state.last_force = Instant::now();
        } else if state.last_force.elapsed() >= self.force_interval {
            mmap.flush()?;
            state.last_force = Instant::now();
        }
        Ok(())
    }
}

impl Sink for MappedFileSink {
    fn append(&self, event: &Event) {
        if self.closed.get() || !self.is_level_enabled(event.level) {
            return;
        }
        let layout = self.layout.lock().clone();
        let mut bytes = layout.format(event);
        super::append_throwable_if_needed(&*layout, event, &mut bytes);
        let mut state = self.state.lock();
        if let Err(e) = self.write_record(&mut state, &bytes) {
            self.messages_failed.fetch_add(1, Ordering::Relaxed);
            diagnostic::report(&self.name, e);
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
            let mut state = self.state.lock();
            if let Some(mmap) = state.mmap.as_ref() {
                let _ = mmap.flush();
            }
            state.mmap = None;
            let exact_len = state.write_offset;
            if let Err(e) = state.file.set_len(exact_len) {
                diagnostic::report(&self.name, e);
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
    fn writes_are_readable_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapped.log");
        let sink = MappedFileSink::new("mapped", &path, true).unwrap();
        sink.set_layout(Arc::new(PatternLayout::new("%message%n")));

        sink.append(&Event::builder("app", Level::Info).message("hello").build());
        sink.append(&Event::builder("app", Level::Info).message("world").build());
        sink.close();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "hello\nworld\n");
    }

    #[test]
    fn grows_and_remaps_past_initial_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapped.log");
        let sink = MappedFileSink::new("mapped", &path, false).unwrap();
        sink.set_layout(Arc::new(PatternLayout::new("%message%n")));

        let big_message = "x".repeat(1024);
        for _ in 0..200 {
            sink.append(&Event::builder("app", Level::Info).message(big_message.clone()).build());
        }
        assert!(sink.remap_count() >= 1);

        sink.close();
        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents.len(), 200 * (1024 + 1));
    }

    #[test]
    fn closed_sink_drops_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapped.log");
        let sink = MappedFileSink::new("mapped", &path, true).unwrap();
        sink.close();
        sink.append(&Event::builder("app", Level::Info).message("dropped").build());
        assert!(sink.is_closed());
    }
}
