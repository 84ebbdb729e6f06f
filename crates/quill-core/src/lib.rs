//! # Quill
//!
//! Process-local log writer that appends text lines to rotating files on disk.
//!
//! ## Features
//!
//! - **Ordered Writes**: Records from concurrent callers land in submission order
//! - **File Rotation**: Calendar-boundary and size-based rotation
//! - **Graceful Shutdown**: SIGINT/SIGTERM, `shutdown()` or dropping the last
//!   handle drain the queue and sync the file
//! - **Configurable**: Builder, JSON files and environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quill_core::{LogConfig, Logger, TimeInterval};
//!
//! #[tokio::main]
//! async fn main() -> quill_core::Result<()> {
//!     let config = LogConfig::builder()
//!         .file_prefix("app-")
//!         .time_interval(TimeInterval::Daily)
//!         .max_bytes(10 * 1024 * 1024)
//!         .build()?;
//!
//!     let logger = Logger::new(config).await?;
//!     logger.info("Application started");
//!
//!     logger.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod caller;
pub mod clock;
pub mod config;
pub mod file;
pub mod format;
pub mod level;
pub mod logger;
#[macro_use]
mod macros;
pub mod record;
pub mod rotation;
pub mod serializer;
pub mod shutdown;

pub use caller::{CachedCallerResolver, CallSite, CallerResolver};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LogConfig, LogConfigBuilder, RollingConfig, TimeInterval};
pub use format::{DefaultFormatter, LineFormatter};
pub use level::LogLevel;
pub use logger::{Logger, LoggerBuilder};
pub use record::LogRecord;
pub use serializer::WriterStats;
pub use shutdown::{ShutdownReason, ShutdownState};

use std::path::PathBuf;

/// Result type for logger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Logger errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Log directory error at {path}: {message}")]
    Directory { path: PathBuf, message: String },

    #[error("Failed to open log file {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Log write failed: {message}")]
    Write { message: String },

    #[error("Logger is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}
