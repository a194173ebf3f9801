//! Public logging API: level-gated event construction and fan-out to
//! sinks, either directly or through an [`AsyncDispatcher`].

use crate::dispatcher::AsyncDispatcher;
use crate::diagnostic;
use crate::event::{Context, Event, Location, Throwable};
use crate::level::Level;
use crate::message::{Arg, MessageFormatter};
use crate::sink::Sink;
use arc_swap::{ArcSwap, ArcSwapOption};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Once};

/// Supplies ambient context (MDC/NDC-shaped) at the moment an event is
/// built. The core never inspects the contents; it is carried verbatim.
pub trait ContextProvider: Send + Sync {
    fn current_context(&self) -> Option<Context>;
}

/// One log call's already-gathered arguments, used internally to share
/// the gating/formatting/dispatch path between every level method.
struct Call<'a> {
    pattern: Option<&'a str>,
    args: &'a [Arg],
}

/// A named logger: a threshold, a set of attached sinks, and optional
/// location capture / context enrichment. Construct via
/// [`LoggerRegistry`](crate::registry::LoggerRegistry), not directly.
pub struct Logger {
    name: Arc<str>,
    threshold: AtomicU32,
    sinks: Arc<ArcSwap<Vec<Arc<dyn Sink>>>>,
    location_capture: AtomicBool,
    context_provider: Option<Arc<dyn ContextProvider>>,
    dispatcher: ArcSwapOption<AsyncDispatcher>,
}

impl Logger {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Logger {
            name: name.into(),
            threshold: AtomicU32::new(Level::Info.weight()),
            sinks: Arc::new(ArcSwap::from_pointee(Vec::new())),
            location_capture: AtomicBool::new(false),
            context_provider: None,
            dispatcher: ArcSwapOption::new(None),
        }
    }

    /// The same copy-on-write sink list this logger fans out to
    /// directly, shared so an [`AsyncDispatcher`] can be constructed to
    /// drain into the identical list before calling
    /// [`Logger::with_dispatcher`].
    pub fn shared_sinks(&self) -> Arc<ArcSwap<Vec<Arc<dyn Sink>>>> {
        Arc::clone(&self.sinks)
    }

    /// Wrap an [`AsyncDispatcher`] so this logger's events flow through
    /// the ring buffer instead of direct synchronous fan-out.
    pub fn with_dispatcher(self, dispatcher: Arc<AsyncDispatcher>) -> Self {
        self.dispatcher.store(Some(dispatcher));
        self
    }

    /// Attach or replace the [`AsyncDispatcher`] this logger dispatches
    /// through, after construction (e.g. once the registry already holds
    /// this logger as an `Arc`). Pass `None` to fall back to direct
    /// synchronous fan-out.
    pub fn set_dispatcher(&self, dispatcher: Option<Arc<AsyncDispatcher>>) {
        self.dispatcher.store(dispatcher);
    }

    /// The dispatcher this logger submits through, if any.
    pub fn dispatcher(&self) -> Option<Arc<AsyncDispatcher>> {
        self.dispatcher.load_full()
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context_provider = Some(provider);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_level(&self, level: Level) {
        self.threshold.store(level.weight(), Ordering::Relaxed);
    }

    pub fn level(&self) -> Level {
        Level::from_weight(self.threshold.load(Ordering::Relaxed))
    }

    pub fn set_location_capture(&self, enabled: bool) {
        self.location_capture.store(enabled, Ordering::Relaxed);
    }

    pub fn add_sink(&self, sink: Arc<dyn Sink>) {
        self.sinks.rcu(|current| {
            let mut next = current.clone();
            next.push(Arc::clone(&sink));
            next
        });
    }

    /// Removes the first sink whose name matches, if any.
    pub fn remove_sink(&self, name: &str) {
        self.sinks.rcu(|current| {
            current.iter().filter(|s| s.name() != name).cloned().collect::<Vec<_>>()
        });
    }

    pub fn sinks(&self) -> Arc<Vec<Arc<dyn Sink>>> {
        self.sinks.load_full()
    }

    pub fn clear_sinks(&self) {
        self.sinks.store(Arc::new(Vec::new()));
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        level.is_enabled(self.level())
    }

    pub fn is_trace_enabled(&self) -> bool {
        self.is_enabled(Level::Trace)
    }
    pub fn is_debug_enabled(&self) -> bool {
        self.is_enabled(Level::Debug)
    }
    pub fn is_info_enabled(&self) -> bool {
        self.is_enabled(Level::Info)
    }
    pub fn is_warn_enabled(&self) -> bool {
        self.is_enabled(Level::Warn)
    }
    pub fn is_error_enabled(&self) -> bool {
        self.is_enabled(Level::Error)
    }
    pub fn is_fatal_enabled(&self) -> bool {
        self.is_enabled(Level::Fatal)
    }

    pub fn trace(&self, message: &str) {
        self.log(Level::Trace, Call { pattern: Some(message), args: &[] });
    }
    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, Call { pattern: Some(message), args: &[] });
    }
    pub fn info(&self, message: &str) {
        self.log(Level::Info, Call { pattern: Some(message), args: &[] });
    }
    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, Call { pattern: Some(message), args: &[] });
    }
    pub fn error(&self, message: &str) {
        self.log(Level::Error, Call { pattern: Some(message), args: &[] });
    }
    pub fn fatal(&self, message: &str) {
        self.log(Level::Fatal, Call { pattern: Some(message), args: &[] });
    }
    /// Alias of [`Logger::fatal`] - `CRITICAL` is the same level.
    pub fn critical(&self, message: &str) {
        self.fatal(message);
    }

    pub fn trace_args(&self, pattern: &str, args: &[Arg]) {
        self.log(Level::Trace, Call { pattern: Some(pattern), args });
    }
    pub fn debug_args(&self, pattern: &str, args: &[Arg]) {
        self.log(Level::Debug, Call { pattern: Some(pattern), args });
    }
    pub fn info_args(&self, pattern: &str, args: &[Arg]) {
        self.log(Level::Info, Call { pattern: Some(pattern), args });
    }
    pub fn warn_args(&self, pattern: &str, args: &[Arg]) {
        self.log(Level::Warn, Call { pattern: Some(pattern), args });
    }
    pub fn error_args(&self, pattern: &str, args: &[Arg]) {
        self.log(Level::Error, Call { pattern: Some(pattern), args });
    }
    pub fn fatal_args(&self, pattern: &str, args: &[Arg]) {
        self.log(Level::Fatal, Call { pattern: Some(pattern), args });
    }
    pub fn critical_args(&self, pattern: &str, args: &[Arg]) {
        self.fatal_args(pattern, args);
    }

    pub fn error_with_throwable(&self, message: &str, throwable: Throwable) {
        self.log(Level::Error, Call { pattern: Some(message), args: &[Arg::Throwable(throwable)] });
    }
    pub fn fatal_with_throwable(&self, message: &str, throwable: Throwable) {
        self.log(Level::Fatal, Call { pattern: Some(message), args: &[Arg::Throwable(throwable)] });
    }

    /// The core logging path: threshold gate, lazy interpolation,
    /// optional location/context capture, Event construction, fan-out.
    fn log(&self, level: Level, call: Call<'_>) {
        if !self.is_enabled(level) {
            return;
        }

        let (message, throwable) = MessageFormatter::format(call.pattern, call.args);

        let mut builder = Event::builder(Arc::clone(&self.name), level).message(message);
        if self.location_capture.load(Ordering::Relaxed) {
            builder = builder.location(capture_location());
        }
        if let Some(t) = throwable {
            builder = builder.throwable(t);
        }
        if let Some(provider) = &self.context_provider {
            if let Some(ctx) = provider.current_context() {
                builder = builder.context(ctx);
            }
        }
        let event = builder.build();

        match self.dispatcher.load_full() {
            Some(dispatcher) => dispatcher.submit(event),
            None => self.fan_out(&event),
        }
    }

    fn fan_out(&self, event: &Event) {
        let sinks = self.sinks.load();
        for sink in sinks.iter() {
            sink.append(event);
        }
    }
}

static LOCATION_CAPTURE_DIAGNOSTIC: Once = Once::new();

/// Location capture beyond "is it enabled" requires unwinding the real
/// call stack (e.g. via `backtrace`), which this crate does not depend
/// on; callers that enable capture get the unknown placeholder today.
/// The diagnostic fires once per process, not once per call, so enabling
/// location capture never adds a per-event stderr write to the hot path.
fn capture_location() -> Location {
    LOCATION_CAPTURE_DIAGNOSTIC.call_once(|| {
        diagnostic::report("Logger", "location capture enabled but no stack walker attached; using placeholder");
    });
    Location::unknown()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::PatternLayout;
    use crate::sink::{ConsoleSink, ConsoleTarget};

    #[test]
    fn disabled_level_short_circuits_before_formatting() {
        let logger = Logger::new("app");
        logger.set_level(Level::Warn);
        // A pattern with an out-of-range index would panic if ever
        // evaluated; reaching it would only happen if gating failed.
        logger.debug("this will never be formatted");
        assert!(!logger.is_debug_enabled());
    }

    #[test]
    fn add_and_remove_sink_round_trips() {
        let logger = Logger::new("app");
        let sink = Arc::new(ConsoleSink::new("console", ConsoleTarget::Stdout));
        sink.set_layout(Arc::new(PatternLayout::new("%message%n")));
        logger.add_sink(sink);
        assert_eq!(logger.sinks().len(), 1);
        logger.remove_sink("console");
        assert_eq!(logger.sinks().len(), 0);
    }

    #[test]
    fn critical_is_gated_identically_to_fatal() {
        let logger = Logger::new("app");
        logger.set_level(Level::Fatal);
        assert!(logger.is_fatal_enabled());
        logger.critical("boom");
    }

    #[test]
    fn clear_sinks_empties_list() {
        let logger = Logger::new("app");
        logger.add_sink(Arc::new(ConsoleSink::new("a", ConsoleTarget::Stdout)));
        logger.add_sink(Arc::new(ConsoleSink::new("b", ConsoleTarget::Stderr)));
        logger.clear_sinks();
        assert!(logger.sinks().is_empty());
    }

    #[test]
    fn capture_location_placeholder_is_stable_across_calls() {
        // The diagnostic behind this is fire-once (see LOCATION_CAPTURE_DIAGNOSTIC);
        // calling it repeatedly must still return the same placeholder every time.
        assert_eq!(capture_location(), Location::unknown());
        assert_eq!(capture_location(), Location::unknown());
    }

    #[test]
    fn set_dispatcher_routes_log_calls_through_it() {
        use crate::dispatcher::{AsyncDispatcher, OverflowStrategy};
        use std::time::Duration;

        let logger = Logger::new("app");
        let sink = Arc::new(ConsoleSink::new("console", ConsoleTarget::Stdout));
        sink.set_layout(Arc::new(PatternLayout::new("%message%n")));
        logger.add_sink(sink);

        let dispatcher = Arc::new(
            AsyncDispatcher::new(16, OverflowStrategy::Block, Duration::from_secs(1), logger.shared_sinks())
                .unwrap(),
        );
        logger.set_dispatcher(Some(dispatcher.clone()));
        assert!(logger.dispatcher().is_some());

        for i in 0..5 {
            logger.info(&format!("msg-{i}"));
        }
        assert!(dispatcher.flush(Duration::from_secs(2)));
        dispatcher.shutdown();
        assert_eq!(dispatcher.stats().processed, 5);
    }
}
