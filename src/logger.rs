//! # Logger
//!
//! `log` backend that writes to a plain text file, truncated every time the game starts.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use log::{LevelFilter, Log, Metadata, Record};
use thiserror::Error;

/// Errors when setting up logging
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The log file couldn't be created
    #[error("unable to open log file: {0}")]
    Io(#[from] io::Error),
    /// Another logger is already installed
    #[error("{0}")]
    AlreadySet(#[from] log::SetLoggerError),
}

/// Writes each record as a line of the log file. Records logged before a file is opened are dropped.
pub struct FileLogger {
    /// Open log file
    file: Mutex<Option<File>>,
    /// Most verbose level written
    level: LevelFilter,
}
impl FileLogger {
    /// Creates a logger with no file yet
    pub const fn new(level: LevelFilter) -> Self {
        Self {
            file: Mutex::new(None),
            level,
        }
    }

    /// Creates a logger writing to `path`, see [`FileLogger::open`]
    pub fn create(path: &Path, level: LevelFilter) -> Result<Self, LoggerError> {
        let logger = Self::new(level);
        logger.open(path)?;
        Ok(logger)
    }

    /// Creates (or truncates) the log file at `path`, creating its directory if needed
    pub fn open(&self, path: &Path) -> Result<(), LoggerError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = File::create(path)?;
        *self.file.lock().unwrap_or_else(PoisonError::into_inner) = Some(file);
        Ok(())
    }
}
impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Ok(mut file) = self.file.lock() {
            if let Some(file) = file.as_mut() {
                // nowhere left to report a failed log write
                let _ = writeln!(file, "[{:<5}] {}", record.level(), record.args());
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            if let Some(file) = file.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// Level used for the plugin's log: everything in debug builds, messages and up otherwise
pub const fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// The plugin's logger
static LOGGER: FileLogger = FileLogger::new(default_level());

/// Installs the plugin's [`FileLogger`] as the global logger, writing to `path`.
///
/// The file is only opened once the logger is installed, so calling this again leaves the live log alone.
pub fn init(path: &Path) -> Result<(), LoggerError> {
    log::set_logger(&LOGGER)?;
    LOGGER.open(path)?;
    log::set_max_level(LOGGER.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use log::{Level, LevelFilter, Log, Record};

    use super::{init, FileLogger, LoggerError};

    #[test]
    /// Records at or above the level are written, the rest are dropped
    fn test_levels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SKSE").join("SNCTSave.log");
        let logger = FileLogger::create(&path, LevelFilter::Info).unwrap();

        logger.log(
            &Record::builder()
                .level(Level::Info)
                .args(format_args!("hooking vtbls"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .args(format_args!("too chatty"))
                .build(),
        );
        logger.flush();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "[INFO ] hooking vtbls\n");
    }

    #[test]
    /// A second install fails without truncating the log of the first
    fn test_init_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SNCTSave.log");

        init(&path).unwrap();
        log::info!("installed once");
        assert!(matches!(init(&path), Err(LoggerError::AlreadySet(_))));
        log::logger().flush();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("[INFO ] installed once\n"));
    }
}
