//! Key/value configuration: validated once at startup, never re-read by
//! the hot path afterward.

use crate::compression::{CompressionRunner, CompressionSpec};
use crate::dispatcher::{AsyncDispatcher, OverflowStrategy};
use crate::error::{EmberlogError, Result};
use crate::layout::PatternLayout;
use crate::level::Level;
use crate::registry::LoggerRegistry;
use crate::sink::{ConsoleSink, ConsoleTarget, RollingFileSink};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Block timeout used for the root dispatcher's `Block` overflow
/// strategy when `async.enabled` is set; not itself configurable.
const ASYNC_BLOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// The opaque external key/value bag (env-style or TOML-style, flattened
/// by the caller into dotted keys, e.g. `console.enabled`, `file.maxSize`).
#[derive(Debug, Clone, Default)]
pub struct ConfigMap(HashMap<String, String>);

impl ConfigMap {
    pub fn new() -> Self {
        ConfigMap(HashMap::new())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        ConfigMap(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleTargetSetting {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct ConsoleSinkSettings {
    pub enabled: bool,
    pub target: ConsoleTargetSetting,
    pub pattern: String,
    pub level: Level,
}

#[derive(Debug, Clone)]
pub struct FileSinkSettings {
    pub enabled: bool,
    pub path: String,
    pub pattern: String,
    pub level: Level,
    pub max_size_bytes: u64,
    pub max_backups: usize,
    pub compress: bool,
    pub compress_program: Option<String>,
    pub compress_args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AsyncSettings {
    /// Whether the root logger dispatches through an `AsyncDispatcher` at
    /// all; `false` means direct synchronous fan-out.
    pub enabled: bool,
    pub buffer_size: usize,
    pub overflow_strategy: OverflowStrategy,
}

/// Fully validated configuration, produced only by [`Config::resolve`].
/// Everything downstream of this struct is assumed correct.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub root_level: Level,
    pub location_capture: bool,
    pub console: ConsoleSinkSettings,
    pub file: FileSinkSettings,
    pub async_settings: AsyncSettings,
    pub logger_levels: HashMap<String, Level>,
}

pub struct Config;

impl Config {
    /// Validate every recognized key in `map` and produce a
    /// [`ResolvedConfig`], or the first [`EmberlogError::Configuration`]
    /// encountered, naming the offending key.
    pub fn resolve(map: &ConfigMap) -> Result<ResolvedConfig> {
        let root_level = parse_level_key(map, "rootLevel", Level::Info)?;
        let location_capture = parse_bool_key(map, "locationCapture", false)?;

        let console = ConsoleSinkSettings {
            enabled: parse_bool_key(map, "console.enabled", true)?,
            target: parse_console_target(map)?,
            pattern: map.get("console.pattern").unwrap_or("%message%n").to_string(),
            level: parse_level_key(map, "console.level", Level::All)?,
        };

        let file = FileSinkSettings {
            enabled: parse_bool_key(map, "file.enabled", false)?,
            path: map.get("file.path").unwrap_or("app.log").to_string(),
            pattern: map.get("file.pattern").unwrap_or("%date [%level] %logger - %message%n").to_string(),
            level: parse_level_key(map, "file.level", Level::All)?,
            max_size_bytes: parse_size_key(map, "file.maxSize", 10 * 1024 * 1024)?,
            max_backups: parse_usize_key(map, "file.maxBackups", 5)?,
            compress: parse_bool_key(map, "file.compress", false)?,
            compress_program: map.get("file.compress.program").map(str::to_string),
            compress_args: map
                .get("file.compress.args")
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        };

        let async_settings = AsyncSettings {
            enabled: parse_bool_key(map, "async.enabled", false)?,
            buffer_size: parse_power_of_two_key(map, "async.bufferSize", 1024)?,
            overflow_strategy: parse_overflow_key(map, "async.overflowStrategy", OverflowStrategy::Block)?,
        };

        let mut logger_levels = HashMap::new();
        for (key, value) in map.0.iter() {
            if let Some(logger_name) = key.strip_prefix("logger.") {
                let level = Level::from_str(value).map_err(|_| EmberlogError::Configuration {
                    key: key.clone(),
                    reason: format!("'{value}' is not a valid level"),
                })?;
                logger_levels.insert(logger_name.to_string(), level);
            }
        }

        Ok(ResolvedConfig {
            root_level,
            location_capture,
            console,
            file,
            async_settings,
            logger_levels,
        })
    }
}

impl ResolvedConfig {
    /// Builds a running [`LoggerRegistry`] wired up exactly as this
    /// configuration describes: a console sink, an optional rolling file
    /// sink (with compression if configured), optional async dispatch on
    /// the root logger, and the per-logger level overrides collected into
    /// `logger_levels` applied to loggers materialized up front.
    pub fn build_registry(&self) -> Result<Arc<LoggerRegistry>> {
        let registry = LoggerRegistry::new();
        let root = registry.root();
        root.set_level(self.root_level);
        root.set_location_capture(self.location_capture);

        if self.console.enabled {
            let target = match self.console.target {
                ConsoleTargetSetting::Stdout => ConsoleTarget::Stdout,
                ConsoleTargetSetting::Stderr => ConsoleTarget::Stderr,
            };
            let console_sink = ConsoleSink::new("console", target);
            console_sink.set_layout(Arc::new(PatternLayout::new(&self.console.pattern)));
            console_sink.set_level(self.console.level);
            root.add_sink(Arc::new(console_sink));
        }

        if self.file.enabled {
            let compression_runner = if self.file.compress {
                self.file.compress_program.as_ref().map(|program| {
                    Arc::new(CompressionRunner::new(CompressionSpec {
                        program: program.clone(),
                        args: self.file.compress_args.clone(),
                        timeout: Duration::from_secs(30),
                    }))
                })
            } else {
                None
            };
            let file_sink = RollingFileSink::new(
                "file",
                self.file.path.clone(),
                self.file.max_size_bytes,
                self.file.max_backups,
                compression_runner,
            )?;
            file_sink.set_layout(Arc::new(PatternLayout::new(&self.file.pattern)));
            file_sink.set_level(self.file.level);
            root.add_sink(Arc::new(file_sink));
        }

        if self.async_settings.enabled {
            let dispatcher = Arc::new(AsyncDispatcher::new(
                self.async_settings.buffer_size,
                self.async_settings.overflow_strategy,
                ASYNC_BLOCK_TIMEOUT,
                root.shared_sinks(),
            )?);
            root.set_dispatcher(Some(dispatcher));
        }

        for (name, level) in &self.logger_levels {
            registry.get_or_create(name).set_level(*level);
        }

        Ok(registry)
    }
}

fn parse_level_key(map: &ConfigMap, key: &str, default: Level) -> Result<Level> {
    match map.get(key) {
        None => Ok(default),
        Some(raw) => Level::from_str(raw).map_err(|_| EmberlogError::Configuration {
            key: key.to_string(),
            reason: format!("'{raw}' is not a valid level"),
        }),
    }
}

fn parse_bool_key(map: &ConfigMap, key: &str, default: bool) -> Result<bool> {
    match map.get(key) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(EmberlogError::Configuration {
                key: key.to_string(),
                reason: format!("'{raw}' is not 'true' or 'false'"),
            }),
        },
    }
}

fn parse_size_key(map: &ConfigMap, key: &str, default: u64) -> Result<u64> {
    match map.get(key) {
        None => Ok(default),
        Some(raw) => crate::size::parse_size(raw).map_err(|_| EmberlogError::Configuration {
            key: key.to_string(),
            reason: format!("'{raw}' is not a valid size (expected e.g. '10M')"),
        }),
    }
}

fn parse_usize_key(map: &ConfigMap, key: &str, default: usize) -> Result<usize> {
    match map.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<usize>().map_err(|_| EmberlogError::Configuration {
            key: key.to_string(),
            reason: format!("'{raw}' is not a non-negative integer"),
        }),
    }
}

fn parse_power_of_two_key(map: &ConfigMap, key: &str, default: usize) -> Result<usize> {
    let value = parse_usize_key(map, key, default)?;
    if value == 0 || !value.is_power_of_two() {
        return Err(EmberlogError::Configuration {
            key: key.to_string(),
            reason: format!("{value} is not a power of two"),
        });
    }
    Ok(value)
}

fn parse_overflow_key(map: &ConfigMap, key: &str, default: OverflowStrategy) -> Result<OverflowStrategy> {
    match map.get(key) {
        None => Ok(default),
        Some(raw) => OverflowStrategy::from_str(raw).map_err(|_| EmberlogError::Configuration {
            key: key.to_string(),
            reason: format!("'{raw}' is not a known overflow strategy"),
        }),
    }
}

fn parse_console_target(map: &ConfigMap) -> Result<ConsoleTargetSetting> {
    match map.get("console.target") {
        None => Ok(ConsoleTargetSetting::Stdout),
        Some(raw) => match raw.to_ascii_uppercase().as_str() {
            "STDOUT" => Ok(ConsoleTargetSetting::Stdout),
            "STDERR" => Ok(ConsoleTargetSetting::Stderr),
            other => Err(EmberlogError::Configuration {
                key: "console.target".to_string(),
                reason: format!("'{other}' is not STDOUT or STDERR"),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_map_is_empty() {
        let map = ConfigMap::new();
        let resolved = Config::resolve(&map).unwrap();
        assert_eq!(resolved.root_level, Level::Info);
        assert!(!resolved.file.enabled);
        assert_eq!(resolved.async_settings.buffer_size, 1024);
    }

    #[test]
    fn rejects_invalid_level_naming_the_key() {
        let mut map = ConfigMap::new();
        map.set("rootLevel", "NOT_A_LEVEL");
        let err = Config::resolve(&map).unwrap_err();
        match err {
            EmberlogError::Configuration { key, .. } => assert_eq!(key, "rootLevel"),
            other => panic!("expected Configuration error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_power_of_two_buffer_size() {
        let mut map = ConfigMap::new();
        map.set("async.bufferSize", "1000");
        assert!(Config::resolve(&map).is_err());
    }

    #[test]
    fn parses_file_and_async_settings() {
        let mut map = ConfigMap::new();
        map.set("file.enabled", "true");
        map.set("file.maxSize", "10M");
        map.set("file.maxBackups", "3");
        map.set("async.overflowStrategy", "DROP_OLDEST");
        let resolved = Config::resolve(&map).unwrap();
        assert!(resolved.file.enabled);
        assert_eq!(resolved.file.max_size_bytes, 10 * 1024 * 1024);
        assert_eq!(resolved.file.max_backups, 3);
        assert_eq!(resolved.async_settings.overflow_strategy, OverflowStrategy::DropOldest);
    }

    #[test]
    fn per_logger_levels_are_collected() {
        let mut map = ConfigMap::new();
        map.set("logger.app.db", "DEBUG");
        let resolved = Config::resolve(&map).unwrap();
        assert_eq!(resolved.logger_levels.get("app.db"), Some(&Level::Debug));
    }

    #[test]
    fn build_registry_wires_file_sink_and_per_logger_levels() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = ConfigMap::new();
        map.set("console.enabled", "false");
        map.set("file.enabled", "true");
        map.set("file.path", dir.path().join("app.log").to_string_lossy().to_string());
        map.set("logger.app.db", "DEBUG");

        let resolved = Config::resolve(&map).unwrap();
        let registry = resolved.build_registry().unwrap();

        registry.root().info("hello from config");
        registry.shutdown();

        assert_eq!(registry.get_or_create("app.db").level(), Level::Debug);
        let contents = std::fs::read_to_string(dir.path().join("app.log")).unwrap();
        assert!(contents.contains("hello from config"));
    }

    #[test]
    fn build_registry_attaches_async_dispatcher_when_enabled() {
        let mut map = ConfigMap::new();
        map.set("console.enabled", "false");
        map.set("async.enabled", "true");
        map.set("async.bufferSize", "16");

        let resolved = Config::resolve(&map).unwrap();
        let registry = resolved.build_registry().unwrap();
        assert!(registry.root().dispatcher().is_some());
        registry.shutdown();
    }
}
