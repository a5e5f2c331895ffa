//! Stderr diagnostics, kept separate from the `git fast-import` command
//! stream that is written to stdout.
//!
//! The teacher's logger layers `tracing`/`tracing-chrome` spans on top of
//! `log` so that a long-lived monorepo daemon can be profiled across many
//! subprocess invocations. This tool is a single streaming pass over stdin
//! with no subprocesses of its own to span, so only the plain `log`
//! frontend plus colored level tags survive the trip.

use colored::Colorize as _;
use std::sync::Mutex;
use std::sync::OnceLock;

static GLOBAL_LOGGER: OnceLock<StderrLogger> = OnceLock::new();

struct StderrLogger {
    level: Mutex<log::LevelFilter>,
}

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= *self.level.lock().unwrap()
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("{}: {}", level_colored(record.level()), record.args());
        }
    }

    fn flush(&self) {}
}

fn level_colored(level: log::Level) -> colored::ColoredString {
    let s = level.as_str();
    match level {
        log::Level::Error => s.red().bold(),
        log::Level::Warn => s.yellow().bold(),
        log::Level::Info => s.green(),
        log::Level::Debug => s.blue(),
        log::Level::Trace => s.into(),
    }
}

/// Installs the global logger. Idempotent: later calls only adjust the level.
pub fn init(level: log::LevelFilter) {
    let logger = GLOBAL_LOGGER.get_or_init(|| StderrLogger {
        level: Mutex::new(level),
    });
    if log::set_logger(logger).is_ok() {
        log::set_max_level(log::LevelFilter::Trace);
    }
    set_level(level);
}

/// Adjusts the installed logger's level, e.g. from `-v`/`-q` flags.
pub fn set_level(level: log::LevelFilter) {
    if let Some(logger) = GLOBAL_LOGGER.get() {
        *logger.level.lock().unwrap() = level;
    }
}
