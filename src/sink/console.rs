//! Writes formatted events to a standard stream.

use super::{ClosedFlag, LevelCell, Sink};
use crate::event::Event;
use crate::layout::{Layout, PatternLayout};
use crate::level::Level;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

/// Which standard stream a [`ConsoleSink`] writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleTarget {
    Stdout,
    Stderr,
}

/// Writes the layout's bytes to stdout or stderr under an internal
/// mutex, flushing after every record. `close()` stops further writes
/// but never closes the underlying stream handle.
pub struct ConsoleSink {
    name: String,
    target: ConsoleTarget,
    layout: Mutex<Arc<dyn Layout>>,
    level: LevelCell,
    closed: ClosedFlag,
}

impl ConsoleSink {
    pub fn new(name: impl Into<String>, target: ConsoleTarget) -> Self {
        ConsoleSink {
            name: name.into(),
            target,
            layout: Mutex::new(Arc::new(PatternLayout::new("%message%n"))),
            level: LevelCell::new(Level::All),
            closed: ClosedFlag::new(),
        }
    }
}

impl Sink for ConsoleSink {
    fn append(&self, event: &Event) {
        if self.closed.get() || !self.is_level_enabled(event.level) {
            return;
        }
        let layout = self.layout.lock().clone();
        let mut bytes = layout.format(event);
        super::append_throwable_if_needed(&*layout, event, &mut bytes);
        match self.target {
            ConsoleTarget::Stdout => {
                let mut out = io::stdout().lock();
                let _ = out.write_all(&bytes);
                let _ = out.flush();
            }
            ConsoleTarget::Stderr => {
                let mut err = io::stderr().lock();
                let _ = err.write_all(&bytes);
                let _ = err.flush();
            }
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
        self.closed.close();
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
