//! The immutable unit of work that flows through the rest of the crate.

use crate::level::Level;
use smallvec::SmallVec;
use std::sync::Arc;

/// Call-site coordinates captured by stack inspection, when enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub class: String,
    pub method: String,
    pub file: String,
    pub line: u32,
}

impl Location {
    /// The placeholder location used when capture is disabled.
    pub fn unknown() -> Self {
        Location {
            class: "Unknown".to_string(),
            method: "unknown".to_string(),
            file: "Unknown".to_string(),
            line: 0,
        }
    }
}

/// A captured error/exception, with a finite, acyclic cause chain.
///
/// Cause chains are capped at [`Throwable::MAX_CAUSE_DEPTH`] to defend
/// against pathological inputs; anything deeper is silently truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Throwable {
    pub class: String,
    pub message: String,
    pub stack_frames: SmallVec<[String; 8]>,
    pub cause: Option<Box<Throwable>>,
}

impl Throwable {
    /// Bound on cause-chain depth, guarding against cyclic or pathologically
    /// deep cause chains.
    pub const MAX_CAUSE_DEPTH: usize = 10;

    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Throwable {
            class: class.into(),
            message: message.into(),
            stack_frames: SmallVec::new(),
            cause: None,
        }
    }

    /// Attach a cause, truncating the chain at [`Throwable::MAX_CAUSE_DEPTH`].
    pub fn with_cause(mut self, cause: Throwable) -> Self {
        let depth = cause.cause_depth();
        if depth < Self::MAX_CAUSE_DEPTH {
            self.cause = Some(Box::new(cause));
        } else {
            self.cause = Some(Box::new(Throwable::new(cause.class, cause.message)));
        }
        self
    }

    fn cause_depth(&self) -> usize {
        let mut depth = 0;
        let mut cur = self.cause.as_deref();
        while let Some(t) = cur {
            depth += 1;
            cur = t.cause.as_deref();
        }
        depth
    }
}

/// Pass-through key/value context plus an ordered stack (MDC/NDC-shaped).
/// The core never reads or mutates the contents; it is carried verbatim
/// from whatever `context_provider` a `Logger` was given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    pub map: Vec<(String, String)>,
    pub stack: Vec<String>,
}

/// An immutable record of one log call.
///
/// Once constructed, an `Event` is never modified. It is routinely shared
/// (via `Arc`) between a `RingBuffer` slot and the sinks it is eventually
/// fanned out to.
#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp_millis: i64,
    pub level: Level,
    pub logger_name: Arc<str>,
    pub message: Option<String>,
    pub thread_name: String,
    pub location: Option<Location>,
    pub throwable: Option<Throwable>,
    pub context: Option<Context>,
}

impl Event {
    pub fn builder(logger_name: impl Into<Arc<str>>, level: Level) -> EventBuilder {
        EventBuilder::new(logger_name.into(), level)
    }
}

/// Builder for [`Event`], capturing the current wall clock and thread name
/// at `build()` time the way the call site would.
pub struct EventBuilder {
    logger_name: Arc<str>,
    level: Level,
    message: Option<String>,
    location: Option<Location>,
    throwable: Option<Throwable>,
    context: Option<Context>,
}

impl EventBuilder {
    fn new(logger_name: Arc<str>, level: Level) -> Self {
        EventBuilder {
            logger_name,
            level,
            message: None,
            location: None,
            throwable: None,
            context: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn throwable(mut self, throwable: Throwable) -> Self {
        self.throwable = Some(throwable);
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn build(self) -> Event {
        Event {
            timestamp_millis: now_millis(),
            level: self.level,
            logger_name: self.logger_name,
            message: self.message,
            thread_name: current_thread_name(),
            location: self.location,
            throwable: self.throwable,
            context: self.context,
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn current_thread_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_captures_thread_and_timestamp() {
        let event = Event::builder("app.main", Level::Info)
            .message("hello")
            .build();
        assert_eq!(&*event.logger_name, "app.main");
        assert_eq!(event.message.as_deref(), Some("hello"));
        assert!(event.timestamp_millis > 0);
    }

    #[test]
    fn throwable_cause_chain_truncates_at_max_depth() {
        let mut t = Throwable::new("RootCause", "root");
        for i in 0..(Throwable::MAX_CAUSE_DEPTH + 5) {
            t = Throwable::new(format!("Layer{i}"), format!("msg{i}")).with_cause(t);
        }
        let mut depth = 0;
        let mut cur = t.cause.as_deref();
        while let Some(inner) = cur {
            depth += 1;
            cur = inner.cause.as_deref();
        }
        assert!(depth <= Throwable::MAX_CAUSE_DEPTH);
    }

    #[test]
    fn unknown_location_uses_fixed_placeholders() {
        let loc = Location::unknown();
        assert_eq!(loc.class, "Unknown");
        assert_eq!(loc.method, "unknown");
        assert_eq!(loc.file, "Unknown");
        assert_eq!(loc.line, 0);
    }
}
