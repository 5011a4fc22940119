//! `log` records routed to the PostgreSQL server log

use log::{Level, LevelFilter, Log, Metadata, Record};
use pgrx::PgLogLevel;

static LOGGER: PgLogger = PgLogger;

/// Forwards `log` records to `ereport`
///
/// Error records are reported as warnings: raising an ERROR from a logging
/// call would abort the caller's transaction.
pub struct PgLogger;

impl Log for PgLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with(env!("CARGO_CRATE_NAME"))
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match server_level(record.level()) {
            PgLogLevel::WARNING => pgrx::warning!("pg_isolate: {}", record.args()),
            PgLogLevel::LOG => pgrx::log!("pg_isolate: {}", record.args()),
            PgLogLevel::DEBUG1 => pgrx::debug1!("pg_isolate: {}", record.args()),
            _ => pgrx::debug2!("pg_isolate: {}", record.args()),
        }
    }

    fn flush(&self) {}
}

/// Server log level for a `log` level
///
/// Info goes to `LOG`, which reaches the server log but not the client, so
/// namespace lifecycle messages never interleave with a test's query output.
pub fn server_level(level: Level) -> PgLogLevel {
    match level {
        Level::Error | Level::Warn => PgLogLevel::WARNING,
        Level::Info => PgLogLevel::LOG,
        Level::Debug => PgLogLevel::DEBUG1,
        Level::Trace => PgLogLevel::DEBUG2,
    }
}

/// Install the logger; a second call (or another installed logger) is ignored
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        // Server-side filtering happens through log_min_messages
        log::set_max_level(LevelFilter::Trace);
    }
}
