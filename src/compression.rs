//! Asynchronous, out-of-band compression of rotated backup files.

use crate::diagnostic;
use crossbeam_channel::{bounded, Sender};
use std::path::PathBuf;
use std::process::Command;
use std::thread::JoinHandle;
use std::time::Duration;

/// How to invoke an external compressor on a rotated file.
#[derive(Debug, Clone)]
pub struct CompressionSpec {
    /// Program name or path, e.g. `"gzip"`.
    pub program: String,
    /// Arguments. A literal `"{}"` element is replaced with the target
    /// path; if no such placeholder is present the path is appended as
    /// the final argument.
    pub args: Vec<String>,
    /// Bounded wait for the external process to exit.
    pub timeout: Duration,
}

impl CompressionSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        CompressionSpec {
            program: program.into(),
            args,
            timeout: Duration::from_secs(60),
        }
    }

    fn build_command(&self, path: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.program);
        let path_str = path.to_string_lossy().into_owned();
        let mut saw_placeholder = false;
        for arg in &self.args {
            if arg == "{}" {
                cmd.arg(&path_str);
                saw_placeholder = true;
            } else {
                cmd.arg(arg);
            }
        }
        if !saw_placeholder {
            cmd.arg(&path_str);
        }
        cmd
    }
}

/// Spawns a single dedicated worker thread that compresses rotated files
/// one at a time, off the rotation path. `close()` drains the queue
/// (best-effort) with a timeout and joins the worker.
pub struct CompressionRunner {
    sender: Sender<PathBuf>,
    handle: Option<JoinHandle<()>>,
}

impl CompressionRunner {
    pub fn new(spec: CompressionSpec) -> Self {
        let (sender, receiver) = bounded::<PathBuf>(256);
        let handle = std::thread::spawn(move || {
            while let Ok(path) = receiver.recv() {
                run_one(&spec, &path);
            }
        });
        CompressionRunner {
            sender,
            handle: Some(handle),
        }
    }

    /// Enqueue a rotated backup for compression. Never blocks the
    /// rotation path; a full or disconnected queue drops the request and
    /// emits a diagnostic.
    pub fn enqueue(&self, path: PathBuf) {
        if self.sender.try_send(path.clone()).is_err() {
            diagnostic::report(
                "CompressionRunner",
                format!("queue full or closed, leaving {} uncompressed", path.display()),
            );
        }
    }

    /// Drain with a timeout, then join the worker.
    pub fn close(&mut self, drain_timeout: Duration) {
        let deadline = std::time::Instant::now() + drain_timeout;
        while !self.sender.is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        // Dropping the sender unblocks the worker's recv() loop.
        drop(std::mem::replace(&mut self.sender, bounded(1).0));
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_one(spec: &CompressionSpec, path: &std::path::Path) {
    let mut cmd = spec.build_command(path);
    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            diagnostic::report(
                "CompressionRunner",
                format!("failed to launch '{}' for {}: {e}", spec.program, path.display()),
            );
            return;
        }
    };

    match wait_with_timeout(child, spec.timeout) {
        Ok(status) if status.success() => {}
        Ok(status) => {
            diagnostic::report(
                "CompressionRunner",
                format!("'{}' exited with {status} for {}", spec.program, path.display()),
            );
        }
        Err(e) => {
            diagnostic::report(
                "CompressionRunner",
                format!("'{}' timed out or failed for {}: {e}", spec.program, path.display()),
            );
        }
    }
}

fn wait_with_timeout(
    mut child: std::process::Child,
    timeout: Duration,
) -> std::io::Result<std::process::ExitStatus> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if std::time::Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "compression timed out"));
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

impl Drop for CompressionRunner {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.close(Duration::from_secs(5));
        }
    }
}
