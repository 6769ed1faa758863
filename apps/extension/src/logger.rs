//! Process logging for the extension host.
//!
//! Records go to colored stdout and to `<log_dir>/tunnel-extension.log`.
//! The host binary and `tunnel_core` are filtered separately so the core can
//! be traced without drowning in host noise; every other crate is held at
//! `warn`. Engine stderr does not come through here; it goes to the
//! diagnostic channel under the base directory.
//!
//! Levels come from `TUNNEL_LOG`: either one level for both crates
//! (`debug`) or comma-separated overrides (`host=info,core=trace`). A bare
//! level may be combined with overrides (`info,core=trace`).

use crate::error::ExtensionError;

use common::ErrorLocation;
use tunnel_core::APP_DIR_NAME;

use std::env;
use std::fmt::Arguments;
use std::io::stdout;
use std::panic::Location;
use std::path::Path;
use std::str::FromStr;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use const_format::concatcp;
use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use fern::{Dispatch, FormatCallback};
use humantime::format_rfc3339;
use log::{LevelFilter, Record, info, warn};

static INIT_LOGGER_ONCE: Once = Once::new();
static LOGGER_ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

/// Log file name inside the log directory.
pub const LOG_FILE_NAME: &str = concatcp!(APP_DIR_NAME, ".log");

/// Environment variable holding the level directives.
pub const LOG_LEVEL_ENV: &str = "TUNNEL_LOG";

const HOST_TARGET: &str = "tunnel_extension";
const CORE_TARGET: &str = "tunnel_core";
const DEPENDENCY_LEVEL: LevelFilter = LevelFilter::Warn;

#[cfg(debug_assertions)]
const DEFAULT_LEVEL: LevelFilter = LevelFilter::Debug;

#[cfg(not(debug_assertions))]
const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// Per-crate level filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevels {
    pub host: LevelFilter,
    pub core: LevelFilter,
}

impl Default for LogLevels {
    fn default() -> Self {
        Self {
            host: DEFAULT_LEVEL,
            core: DEFAULT_LEVEL,
        }
    }
}

impl LogLevels {
    /// Levels from `TUNNEL_LOG`, or the build default when it is unset.
    ///
    /// # Errors
    ///
    /// Returns a config error if the variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ExtensionError> {
        match env::var(LOG_LEVEL_ENV) {
            Ok(directives) => Self::parse(&directives),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Parse level directives, starting from the build default.
    #[track_caller]
    pub fn parse(directives: &str) -> Result<Self, ExtensionError> {
        let mut levels = Self::default();

        for directive in directives.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            match directive.split_once('=') {
                None => {
                    let level = parse_level(directive)?;
                    levels.host = level;
                    levels.core = level;
                }
                Some((target, level)) => match target.trim() {
                    "host" => levels.host = parse_level(level)?,
                    "core" => levels.core = parse_level(level)?,
                    other => {
                        return Err(ExtensionError::Config {
                            message: format!(
                                "Unknown log target '{other}' in {LOG_LEVEL_ENV} (expected host or core)"
                            ),
                            location: ErrorLocation::from(Location::caller()),
                        });
                    }
                },
            }
        }

        Ok(levels)
    }
}

#[track_caller]
fn parse_level(value: &str) -> Result<LevelFilter, ExtensionError> {
    LevelFilter::from_str(value.trim()).map_err(|_| ExtensionError::Config {
        message: format!("Invalid log level '{}' in {LOG_LEVEL_ENV}", value.trim()),
        location: ErrorLocation::from(Location::caller()),
    })
}

/// Install the global logger.
///
/// Only the first call does anything; later calls log a warning and return
/// `Ok`, even if the first one failed.
///
/// # Errors
///
/// Returns an error if the log file cannot be created under `log_dir` or the
/// global logger was already set by someone else.
pub fn initialize(log_dir: &Path, levels: LogLevels) -> Result<(), ExtensionError> {
    if LOGGER_ALREADY_CALLED.swap(true, Ordering::SeqCst) {
        warn!("Logger already initialized");
        return Ok(());
    }

    let mut result = Ok(());
    INIT_LOGGER_ONCE.call_once(|| {
        result = install(log_dir, levels);
        if result.is_ok() {
            info!(
                "Logger initialized (host: {}, core: {}, file: {})",
                levels.host,
                levels.core,
                log_dir.join(LOG_FILE_NAME).display()
            );
        }
    });
    result
}

#[track_caller]
fn install(log_dir: &Path, levels: LogLevels) -> Result<(), ExtensionError> {
    let colors = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let log_file = fern::log_file(log_dir.join(LOG_FILE_NAME)).map_err(|e| {
        ExtensionError::Extension {
            message: format!("Failed to create log file in {}: {e}", log_dir.display()),
            location: ErrorLocation::from(Location::caller()),
        }
    })?;

    Dispatch::new()
        .level(DEPENDENCY_LEVEL)
        .level_for(HOST_TARGET, levels.host)
        .level_for(CORE_TARGET, levels.core)
        .chain(
            Dispatch::new()
                .format(line_format(Some(colors)))
                .chain(stdout()),
        )
        .chain(Dispatch::new().format(line_format(None)).chain(log_file))
        .apply()
        .map_err(|e| ExtensionError::Extension {
            message: format!("Failed to initialize logger: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
}

/// `[<time> - <level>] <target>: <message> [<file>:<line>]`, with the level
/// colored when `colors` is given.
fn line_format(
    colors: Option<ColoredLevelConfig>,
) -> impl Fn(FormatCallback<'_>, &Arguments<'_>, &Record<'_>) + Send + Sync + 'static {
    move |out, message, record| {
        let date = format_rfc3339(SystemTime::now());
        let target = record.target();
        let file = record.file().unwrap_or("unknown");
        let line = record.line().unwrap_or(0);
        match colors {
            Some(colors) => out.finish(format_args!(
                "[{date} - {}] {target}: {message} [{file}:{line}]",
                colors.color(record.level())
            )),
            None => out.finish(format_args!(
                "[{date} - {}] {target}: {message} [{file}:{line}]",
                record.level()
            )),
        }
    }
}
