//! Structured logging for the downloader
//!
//! Terminal output always goes through a plain fmt layer. When enabled in
//! the config, a second layer writes to a daily rolling file in line or
//! JSON format.

use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::booru::config_loader::Logging;

/// File name prefix of the rolling log file.
const LOG_FILE_NAME: &str = "booru_downloader.log";

/// Error types for logging
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for logging operations
pub type LoggerResult<T> = Result<T, LoggerError>;

/// Keeps the non-blocking file writer alive. Dropping it flushes pending lines.
pub struct Logger {
    _guard: Option<WorkerGuard>,
}

impl Logger {
    /// Install the global subscriber described by `settings`.
    pub fn new(settings: &Logging) -> LoggerResult<Self> {
        // RUST_LOG wins over the configured level
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&settings.log_level))
            .map_err(|e| LoggerError::Logging(e.to_string()))?;

        let terminal_layer = fmt::layer().with_target(false).boxed();

        let (file_layer, guard) = if settings.log_to_file {
            let log_dir = Path::new(&settings.log_directory);
            if !log_dir.exists() {
                std::fs::create_dir_all(log_dir)?;
            }

            let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let layer = match settings.log_format.as_str() {
                "json" => fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .boxed(),
                _ => fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .boxed(),
            };
            (Some(layer), Some(guard))
        } else {
            (None, None)
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(terminal_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| LoggerError::Logging(e.to_string()))?;

        info!(
            log_format = %settings.log_format,
            log_level = %settings.log_level,
            log_to_file = settings.log_to_file,
            "Logger initialized"
        );

        Ok(Self { _guard: guard })
    }
}

/// Create the process-wide logger
pub fn init_logger(settings: &Logging) -> LoggerResult<Logger> {
    Logger::new(settings)
}
