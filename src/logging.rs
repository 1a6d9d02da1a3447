//! Logging configuration
//!
//! Redis-style logging: level names (debug, verbose, notice, warning,
//! nothing), pid-prefixed lines with a level character, and an optional
//! append-only log file falling back to stderr.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::time::SystemTime;

use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

/// Redis-style log levels mapped to Rust log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Verbose,
    Notice,
    Warning,
    Nothing,
}

impl LogLevel {
    /// Parse a Redis-style log level string
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" => Self::Debug,
            "verbose" => Self::Verbose,
            "notice" => Self::Notice,
            "warning" => Self::Warning,
            "nothing" => Self::Nothing,
            _ => Self::Notice, // Default
        }
    }

    /// Convert to Rust log LevelFilter
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::Debug,
            Self::Verbose => LevelFilter::Info,
            Self::Notice => LevelFilter::Info,
            Self::Warning => LevelFilter::Warn,
            Self::Nothing => LevelFilter::Off,
        }
    }
}

/// Logger writing to a file when configured, stderr otherwise
pub struct ExporterLogger {
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl ExporterLogger {
    pub fn new(loglevel: &str, logfile: &str) -> Self {
        let level = LogLevel::from_str(loglevel).to_level_filter();

        let file = if !logfile.is_empty() {
            match OpenOptions::new().create(true).append(true).open(logfile) {
                Ok(f) => Some(Mutex::new(f)),
                Err(e) => {
                    eprintln!("Warning: failed to open log file '{}': {}", logfile, e);
                    None
                }
            }
        } else {
            None
        };

        Self { level, file }
    }

    fn format_record(&self, record: &Record) -> String {
        let level_char = match record.level() {
            log::Level::Error => '!',
            log::Level::Warn => '#',
            log::Level::Info => '*',
            log::Level::Debug => '-',
            log::Level::Trace => '.',
        };

        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        format!(
            "{}:{} {} {}\n",
            std::process::id(),
            level_char,
            secs,
            record.args()
        )
    }
}

impl Log for ExporterLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let formatted = self.format_record(record);

        if let Some(ref file) = self.file {
            let _ = file.lock().write_all(formatted.as_bytes());
        } else {
            eprint!("{}", formatted);
        }
    }

    fn flush(&self) {
        if let Some(ref file) = self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Install the logger for the whole process
pub fn init_logging(loglevel: &str, logfile: &str) -> Result<(), log::SetLoggerError> {
    let logger = Box::new(ExporterLogger::new(loglevel, logfile));
    let level = LogLevel::from_str(loglevel).to_level_filter();

    log::set_boxed_logger(logger)?;
    log::set_max_level(level);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("debug").to_level_filter(), LevelFilter::Debug);
        assert_eq!(LogLevel::from_str("verbose").to_level_filter(), LevelFilter::Info);
        assert_eq!(LogLevel::from_str("notice").to_level_filter(), LevelFilter::Info);
        assert_eq!(LogLevel::from_str("warning").to_level_filter(), LevelFilter::Warn);
        assert_eq!(LogLevel::from_str("nothing").to_level_filter(), LevelFilter::Off);
        // Unknown defaults to notice
        assert_eq!(LogLevel::from_str("unknown").to_level_filter(), LevelFilter::Info);
    }
}
