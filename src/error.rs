//! Crate-wide error type.
//!
//! Every fallible boundary in emberlog - ring buffer construction, sink
//! construction, rotation, compression hand-off, configuration resolution -
//! returns `Result<T>`. The hot logging path (`Logger::info` and friends)
//! never returns `Result` and never panics; failures there are counted and
//! reported to stderr instead (see `crate::diagnostic`).

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EmberlogError>;

/// All fallible outcomes produced by emberlog's configuration and
/// construction surfaces.
#[derive(Debug, Error)]
pub enum EmberlogError {
    /// A level name did not match any known `Level` or alias.
    #[error("invalid log level: '{0}'. Valid levels are: TRACE, DEBUG, INFO, WARN, ERROR, FATAL (alias CRITICAL)")]
    InvalidLevel(String),

    /// A size string did not match the `<number>[K|M|G]` grammar.
    #[error("invalid size limit: '{0}'. Expected format like '500', '5K', '10M', '1G'")]
    InvalidSizeLimit(String),

    /// An overflow strategy name did not match a known variant.
    #[error("invalid overflow strategy: '{0}'. Valid strategies are: BLOCK, DROP_OLDEST, DROP_NEWEST, SYNCHRONOUS_WRITE, DISCARD")]
    InvalidOverflowStrategy(String),

    /// Ring buffer capacity must be a power of two.
    #[error("invalid ring buffer capacity: {0} is not a power of two")]
    InvalidCapacity(usize),

    /// A `ConfigMap` key was present but malformed, or a required key was
    /// absent for the sink type being constructed.
    #[error("configuration error for key '{key}': {reason}")]
    Configuration {
        /// The offending configuration key.
        key: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// An external compression process failed, timed out, or was not found.
    #[error("compression failed for {path}: {reason}")]
    Compression {
        /// Path of the file that failed to compress.
        path: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// Wraps an underlying I/O failure (file open, rename, mmap, etc).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
