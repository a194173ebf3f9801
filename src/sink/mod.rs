//! Sinks: destinations that consume formatted events.

mod batching_file;
mod console;
mod mapped_file;
mod rolling_file;

pub use batching_file::BatchingFileSink;
pub use console::{ConsoleSink, ConsoleTarget};
pub use mapped_file::MappedFileSink;
pub use rolling_file::RollingFileSink;

use crate::event::{Event, Throwable};
use crate::layout::Layout;
use crate::level::Level;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Every sink implementation. `append` must be safe under concurrent
/// invocation from any number of producer threads; a closed sink silently
/// drops events rather than erroring.
pub trait Sink: Send + Sync {
    fn append(&self, event: &Event);
    fn set_layout(&self, layout: Arc<dyn Layout>);
    fn layout(&self) -> Arc<dyn Layout>;
    fn set_level(&self, level: Level);
    fn level(&self) -> Level;
    fn close(&self);
    fn is_closed(&self) -> bool;
    fn name(&self) -> &str;

    fn is_level_enabled(&self, level: Level) -> bool {
        level.is_enabled(self.level())
    }

    /// Count of writes that failed and were reported via diagnostics.
    /// Sinks with no I/O surface (e.g. none yet) may leave this at zero.
    fn messages_failed(&self) -> u64 {
        0
    }
}

/// Appends a plain-text rendering of `event`'s throwable (class, message,
/// one `\tat <frame>` line per stack frame, recursing into `cause` as
/// `Caused by: ...`) to `out`, unless `layout` already renders throwables
/// itself. A no-op if the event carries no throwable.
pub(crate) fn append_throwable_if_needed(layout: &dyn Layout, event: &Event, out: &mut Vec<u8>) {
    if layout.renders_throwable() {
        return;
    }
    if let Some(throwable) = &event.throwable {
        render_throwable(out, throwable, 0);
    }
}

fn render_throwable(out: &mut Vec<u8>, throwable: &Throwable, depth: usize) {
    let mut line = String::new();
    if depth == 0 {
        let _ = writeln!(line, "{}: {}", throwable.class, throwable.message);
    } else {
        let _ = writeln!(line, "Caused by: {}: {}", throwable.class, throwable.message);
    }
    out.extend_from_slice(line.as_bytes());
    for frame in &throwable.stack_frames {
        out.extend_from_slice(b"\tat ");
        out.extend_from_slice(frame.as_bytes());
        out.push(b'\n');
    }
    if let Some(cause) = &throwable.cause {
        render_throwable(out, cause, depth + 1);
    }
}

/// Lock-free holder for a sink's current threshold, stored as the
/// level's weight so reads never block producers.
pub(crate) struct LevelCell(AtomicU32);

impl LevelCell {
    pub(crate) fn new(level: Level) -> Self {
        LevelCell(AtomicU32::new(level.weight()))
    }

    pub(crate) fn get(&self) -> Level {
        Level::from_weight(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn set(&self, level: Level) {
        self.0.store(level.weight(), Ordering::Relaxed);
    }
}

/// Lock-free holder for a sink's closed flag.
pub(crate) struct ClosedFlag(AtomicBool);

impl ClosedFlag {
    pub(crate) fn new() -> Self {
        ClosedFlag(AtomicBool::new(false))
    }

    pub(crate) fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Marks the flag closed. Returns `true` the first time this is
    /// called (so callers can make `close()` idempotent).
    pub(crate) fn close(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}
