//! Size-triggered rolling file sink with backup retention and optional
//! externalized compression of rotated backups.

use super::{ClosedFlag, LevelCell, Sink};
use crate::compression::CompressionRunner;
use crate::diagnostic;
use crate::error::{EmberlogError, Result};
use crate::event::Event;
use crate::layout::{Layout, PatternLayout};
use crate::level::Level;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct FileState {
    file: File,
    current_size: u64,
}

/// Writes formatted events to a file, rotating to a timestamped backup
/// once the file reaches `max_size_bytes`, then reopening the base path
/// fresh. Backups beyond `max_backups` are deleted oldest-first. If a
/// [`CompressionRunner`] is attached, each freshly rotated backup is
/// handed off to it instead of being compressed inline.
pub struct RollingFileSink {
    name: String,
    base_path: PathBuf,
    max_size_bytes: u64,
    max_backups: usize,
    compression_runner: Option<Arc<CompressionRunner>>,
    layout: Mutex<Arc<dyn Layout>>,
    level: LevelCell,
    closed: ClosedFlag,
    state: Mutex<FileState>,
    messages_failed: AtomicU64,
}

impl RollingFileSink {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        max_size_bytes: u64,
        max_backups: usize,
        compression_runner: Option<Arc<CompressionRunner>>,
    ) -> Result<Self> {
        let base_path = path.into();
        let (file, current_size) = open_append(&base_path)?;
        Ok(RollingFileSink {
            name: name.into(),
            base_path,
            max_size_bytes,
            max_backups,
            compression_runner,
            layout: Mutex::new(Arc::new(PatternLayout::new("%date [%level] %logger - %message%n"))),
            level: LevelCell::new(Level::All),
            closed: ClosedFlag::new(),
            state: Mutex::new(FileState { file, current_size }),
            messages_failed: AtomicU64::new(0),
        })
    }

    pub fn messages_failed_count(&self) -> u64 {
        self.messages_failed.load(Ordering::Relaxed)
    }

    fn rotate(&self, state: &mut FileState) {
        if let Err(e) = self.rotate_inner(state) {
            diagnostic::report(&self.name, format!("rotation failed, will retry on next write: {e}"));
        }
    }

    fn rotate_inner(&self, state: &mut FileState) -> Result<()> {
        state.file.flush()?;

        let backup_path = next_backup_path(&self.base_path);
        std::fs::rename(&self.base_path, &backup_path)?;

        let (new_file, _) = open_append(&self.base_path)?;
        state.file = new_file;
        state.current_size = 0;

        if let Some(runner) = &self.compression_runner {
            runner.enqueue(backup_path);
        }

        if let Err(e) = enforce_retention(&self.base_path, self.max_backups) {
            diagnostic::report(&self.name, format!("retention enforcement failed: {e}"));
        }

        Ok(())
    }
}

impl Sink for RollingFileSink {
    fn append(&self, event: &Event) {
        if self.closed.get() || !self.is_level_enabled(event.level) {
            return;
        }
        let layout = self.layout.lock().clone();
        let mut bytes = layout.format(event);
        super::append_throwable_if_needed(&*layout, event, &mut bytes);

        let mut state = self.state.lock();
        match state.file.write_all(&bytes) {
            Ok(()) => state.current_size += bytes.len() as u64,
            Err(e) => {
                self.messages_failed.fetch_add(1, Ordering::Relaxed);
                diagnostic::report(&self.name, e);
                return;
            }
        }

        if state.current_size >= self.max_size_bytes {
            self.rotate(&mut state);
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
            let _ = state.file.flush();
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

fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let current_size = file.metadata()?.len();
    Ok((file, current_size))
}

fn backup_path_for(base_path: &Path, suffix: &str) -> PathBuf {
    let file_name = base_path.file_name().and_then(|s| s.to_str()).unwrap_or("log");
    base_path.with_file_name(format!("{file_name}.{suffix}"))
}

fn next_backup_path(base_path: &Path) -> PathBuf {
    let timestamp = Utc::now().format("%Y-%m-%d-%H-%M-%S").to_string();
    let mut candidate = backup_path_for(base_path, &timestamp);
    let mut tie_break = 1u32;
    while candidate.exists() {
        candidate = backup_path_for(base_path, &format!("{timestamp}.{tie_break}"));
        tie_break += 1;
    }
    candidate
}

/// Removes the oldest backups (by modified time) beyond `max_backups`.
fn enforce_retention(base_path: &Path, max_backups: usize) -> Result<()> {
    let dir = base_path.parent().filter(|p| !p.as_os_str().is_empty());
    let dir: PathBuf = dir.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let file_name = base_path.file_name().and_then(|s| s.to_str()).unwrap_or("log").to_string();
    let prefix = format!("{file_name}.");

    let mut backups: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !name.starts_with(&prefix) || !path.is_file() {
            continue;
        }
        let modified = entry.metadata()?.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        backups.push((modified, path));
    }

    if backups.len() <= max_backups {
        return Ok(());
    }

    backups.sort_by_key(|(modified, _)| *modified);
    let remove_count = backups.len() - max_backups;
    for (_, path) in backups.into_iter().take(remove_count) {
        std::fs::remove_file(&path).map_err(EmberlogError::Io)?;
    }
    Ok(())
}
