//! Name-keyed logger cache, the root logger, and shutdown orchestration.

use crate::logger::Logger;
use crate::sink::Sink;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The name every registry reserves for its root logger.
pub const ROOT_LOGGER_NAME: &str = "ROOT";

/// How long [`LoggerRegistry::shutdown`] waits for each logger's
/// [`AsyncDispatcher`](crate::dispatcher::AsyncDispatcher) to drain its
/// ring buffer before closing sinks out from under it.
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns every [`Logger`] looked up by name for the process lifetime (or
/// until [`LoggerRegistry::shutdown`]). A looked-up name always returns
/// the same `Arc<Logger>` until shutdown.
pub struct LoggerRegistry {
    loggers: RwLock<AHashMap<Arc<str>, Arc<Logger>>>,
    shut_down: AtomicBool,
}

impl LoggerRegistry {
    pub fn new() -> Arc<Self> {
        let registry = Arc::new(LoggerRegistry {
            loggers: RwLock::new(AHashMap::new()),
            shut_down: AtomicBool::new(false),
        });
        registry.get_or_create(ROOT_LOGGER_NAME);
        registry
    }

    /// Returns the cached logger for `name`, creating and caching one if
    /// this is the first lookup. A no-op, returning the root logger, if
    /// called after shutdown.
    pub fn get_or_create(&self, name: &str) -> Arc<Logger> {
        if self.shut_down.load(Ordering::Acquire) {
            return self.root();
        }

        if let Some(existing) = self.loggers.read().get(name) {
            return Arc::clone(existing);
        }

        let mut loggers = self.loggers.write();
        // Re-check under the write lock: another thread may have raced us.
        if let Some(existing) = loggers.get(name) {
            return Arc::clone(existing);
        }
        let logger_name: Arc<str> = Arc::from(name);
        let logger = Arc::new(Logger::new(Arc::clone(&logger_name)));
        loggers.insert(logger_name, Arc::clone(&logger));
        logger
    }

    pub fn root(&self) -> Arc<Logger> {
        self.loggers
            .read()
            .get(ROOT_LOGGER_NAME)
            .cloned()
            .expect("root logger always present")
    }

    pub fn logger_names(&self) -> Vec<Arc<str>> {
        self.loggers.read().keys().cloned().collect()
    }

    /// Drains every logger's [`AsyncDispatcher`](crate::dispatcher::AsyncDispatcher)
    /// (if any), then closes every sink attached to every cached logger
    /// exactly once, then marks the registry shut down. Idempotent: a
    /// second call is a no-op.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let loggers = self.loggers.read();

        for logger in loggers.values() {
            if let Some(dispatcher) = logger.dispatcher() {
                dispatcher.flush(DISPATCHER_DRAIN_TIMEOUT);
                dispatcher.shutdown();
            }
        }

        let mut already_closed: std::collections::HashSet<*const dyn Sink> = std::collections::HashSet::new();
        for logger in loggers.values() {
            for sink in logger.sinks().iter() {
                let ptr = Arc::as_ptr(sink);
                if already_closed.insert(ptr) {
                    sink.close();
                }
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Default for LoggerRegistry {
    fn default() -> Self {
        // `new()` returns an `Arc<Self>`; `Default` is provided for
        // contexts that need a bare value (e.g. embedding in a struct
        // that itself gets `Arc`-wrapped once).
        LoggerRegistry {
            loggers: RwLock::new(AHashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_logger_is_present_at_construction() {
        let registry = LoggerRegistry::new();
        assert_eq!(registry.root().name(), ROOT_LOGGER_NAME);
    }

    #[test]
    fn same_name_returns_same_instance() {
        let registry = LoggerRegistry::new();
        let a = registry.get_or_create("app.service");
        let b = registry.get_or_create("app.service");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn shutdown_is_idempotent_and_closes_sinks_once() {
        use crate::sink::{ConsoleSink, ConsoleTarget};

        let registry = LoggerRegistry::new();
        let logger = registry.get_or_create("app");
        let sink = Arc::new(ConsoleSink::new("console", ConsoleTarget::Stdout));
        logger.add_sink(sink.clone());

        registry.shutdown();
        registry.shutdown();
        assert!(sink.is_closed());
        assert!(registry.is_shut_down());
    }

    #[test]
    fn lookup_after_shutdown_returns_root() {
        let registry = LoggerRegistry::new();
        registry.shutdown();
        let logger = registry.get_or_create("new.logger");
        assert_eq!(logger.name(), ROOT_LOGGER_NAME);
    }

    #[test]
    fn shutdown_drains_async_dispatcher_before_closing_sinks() {
        use crate::dispatcher::{AsyncDispatcher, OverflowStrategy};
        use crate::layout::PatternLayout;
        use crate::sink::{ConsoleSink, ConsoleTarget};
        use std::time::Duration;

        let registry = LoggerRegistry::new();
        let logger = registry.get_or_create("app.async");
        let sink = Arc::new(ConsoleSink::new("console", ConsoleTarget::Stdout));
        sink.set_layout(Arc::new(PatternLayout::new("%message%n")));
        logger.add_sink(sink.clone());

        let dispatcher = Arc::new(
            AsyncDispatcher::new(16, OverflowStrategy::Block, Duration::from_secs(1), logger.shared_sinks())
                .unwrap(),
        );
        logger.set_dispatcher(Some(dispatcher.clone()));

        for i in 0..5 {
            logger.info(&format!("msg-{i}"));
        }

        registry.shutdown();

        assert_eq!(dispatcher.stats().processed, 5);
        assert!(!dispatcher.is_running());
        assert!(sink.is_closed());
    }
}
