//! Internal diagnostic channel.
//!
//! Every component that can fail without propagating the failure to its
//! caller (sink I/O, rotation, compression, async worker crashes) reports
//! exactly one line to stderr through this module, prefixed with the
//! emitting component's name. This is the only place emberlog writes to
//! stderr on its own behalf.

use std::io::Write;

/// Emit a single diagnostic line: `<component>: <message>`.
pub fn report(component: &str, message: impl std::fmt::Display) {
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "{component}: {message}");
}
