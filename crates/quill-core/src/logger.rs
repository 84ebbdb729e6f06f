//! Logger facade tying configuration, writer and shutdown together

use crate::{
    caller::{CachedCallerResolver, CallSite, CallerResolver},
    clock::{Clock, SystemClock},
    config::{LogConfig, TimeInterval},
    file::FileHandleManager,
    format::{DefaultFormatter, LineFormatter},
    rotation::RotationPolicy,
    serializer::{WriteSerializer, WriterStats},
    shutdown::{ShutdownCoordinator, ShutdownReason, ShutdownState},
    LogLevel, LogRecord, Result,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Handle to a rotating file logger. Clones share the same writer.
///
/// Dropping the last clone counts as a normal exit: the final record is
/// queued, the queue is drained and the file is closed before the drop
/// returns.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

struct Inner {
    config: LogConfig,
    serializer: WriteSerializer,
    coordinator: Arc<ShutdownCoordinator>,
    resolver: Arc<dyn CallerResolver>,
    clock: Arc<dyn Clock>,
    writer: Option<JoinHandle<()>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.coordinator.request(ShutdownReason::Exit);

        // Close was requested by now, by this drop or an earlier shutdown
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                tracing::error!(
                    quill.event = "writer_panicked",
                    "Log writer thread panicked"
                );
            }
        }
    }
}

/// Assembles a [`Logger`] with optional replacement collaborators
pub struct LoggerBuilder {
    config: LogConfig,
    clock: Arc<dyn Clock>,
    formatter: Arc<dyn LineFormatter>,
    resolver: Arc<dyn CallerResolver>,
}

impl LoggerBuilder {
    pub fn new(config: LogConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            formatter: Arc::new(DefaultFormatter),
            resolver: Arc::new(CachedCallerResolver::new()),
        }
    }

    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn formatter(mut self, formatter: impl LineFormatter) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    pub fn caller_resolver(mut self, resolver: impl CallerResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Validate the configuration, open the first log file, start the writer
    /// and register signal handling.
    pub async fn build(self) -> Result<Logger> {
        self.config.validate()?;

        let mut manager =
            FileHandleManager::new(&self.config.log_dir, self.config.file_prefix.clone());
        manager.open_new(self.clock.now()).await?;

        let (serializer, writer) = WriteSerializer::spawn(
            manager,
            RotationPolicy::new(self.config.rolling),
            self.formatter,
            Arc::clone(&self.clock),
            self.config.level,
        )?;

        let coordinator = Arc::new(ShutdownCoordinator::new(
            serializer.clone(),
            Arc::clone(&self.clock),
        ));
        let inner = Inner {
            config: self.config,
            serializer,
            coordinator,
            resolver: self.resolver,
            clock: self.clock,
            writer: Some(writer),
        };

        // On failure `inner` drops here, which closes the file just opened
        if inner.config.handle_signals {
            inner
                .coordinator
                .install_signal_handlers(inner.config.exit_on_signal)?;
        }

        let config = &inner.config;
        tracing::info!(
            quill.event = "logger_initialized",
            log_dir = %config.log_dir.display(),
            file_prefix = %config.file_prefix,
            level = %config.level,
            time_interval = %config.rolling.time_interval,
            max_bytes = config.rolling.max_bytes,
            "Logger initialized"
        );

        Ok(Logger {
            inner: Arc::new(inner),
        })
    }
}

impl Logger {
    /// Create a logger for the given configuration
    pub async fn new(config: LogConfig) -> Result<Self> {
        LoggerBuilder::new(config).build().await
    }

    /// Create a logger with the default configuration
    pub async fn with_defaults() -> Result<Self> {
        Self::new(LogConfig::default()).await
    }

    pub fn builder(config: LogConfig) -> LoggerBuilder {
        LoggerBuilder::new(config)
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        let _ = self.log_at(LogLevel::Debug, CallSite::caller(), message);
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        let _ = self.log_at(LogLevel::Info, CallSite::caller(), message);
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<String>) {
        let _ = self.log_at(LogLevel::Warn, CallSite::caller(), message);
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>) {
        let _ = self.log_at(LogLevel::Error, CallSite::caller(), message);
    }

    #[track_caller]
    pub fn critical(&self, message: impl Into<String>) {
        let _ = self.log_at(LogLevel::Critical, CallSite::caller(), message);
    }

    /// Submit a record, reporting `Error::Closed` after shutdown
    #[track_caller]
    pub fn log(&self, level: LogLevel, message: impl Into<String>) -> Result<()> {
        self.log_at(level, CallSite::caller(), message)
    }

    /// Submit a record for an explicit call site
    pub fn log_at(&self, level: LogLevel, site: CallSite, message: impl Into<String>) -> Result<()> {
        let serializer = &self.inner.serializer;
        // Filter before resolving the caller or building the record
        if !serializer.admit(level) {
            return Ok(());
        }

        let caller = self.inner.resolver.resolve(&site);
        serializer.submit(LogRecord::new(
            self.inner.clock.now(),
            level,
            &*caller,
            message,
        ))
    }

    /// Wait until every record submitted so far is on disk
    pub async fn flush(&self) -> Result<()> {
        self.inner.serializer.flush().await
    }

    /// Close the log for a normal exit. Returns `false` if already shut down.
    pub async fn shutdown(&self) -> Result<bool> {
        self.shutdown_with(ShutdownReason::Exit).await
    }

    /// Run the shutdown sequence as if `reason` had been received
    pub async fn shutdown_with(&self, reason: ShutdownReason) -> Result<bool> {
        self.inner.coordinator.trigger(reason).await
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.inner.coordinator.state()
    }

    pub fn stats(&self) -> WriterStats {
        self.inner.serializer.stats()
    }

    /// Path of the file currently receiving writes, if any
    pub fn current_file(&self) -> Option<PathBuf> {
        self.inner.serializer.current_file()
    }

    /// Minimum level written to disk
    pub fn level(&self) -> LogLevel {
        self.inner.config.level
    }

    pub fn file_prefix(&self) -> &str {
        &self.inner.config.file_prefix
    }

    pub fn time_threshold(&self) -> TimeInterval {
        self.inner.config.rolling.time_interval
    }

    /// Size threshold in bytes
    pub fn size_threshold(&self) -> u64 {
        self.inner.config.rolling.max_bytes
    }

    pub fn log_dir(&self) -> &Path {
        &self.inner.config.log_dir
    }

    pub fn config(&self) -> &LogConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("config", &self.inner.config)
            .field("state", &self.shutdown_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> LogConfig {
        LogConfig::builder()
            .log_dir(dir.path().join("logs"))
            .file_prefix("unit-")
            .handle_signals(false)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_accessors_reflect_config() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::new(config(&temp_dir)).await.unwrap();

        assert_eq!(logger.level(), LogLevel::Info);
        assert_eq!(logger.file_prefix(), "unit-");
        assert_eq!(logger.time_threshold(), TimeInterval::Hourly);
        assert_eq!(logger.size_threshold(), 5 * 1024 * 1024);
        assert_eq!(logger.log_dir(), temp_dir.path().join("logs"));
        assert!(logger.current_file().is_some());
    }

    #[tokio::test]
    async fn test_constructor_rejects_invalid_config() {
        let mut bad = LogConfig::default();
        bad.rolling.max_bytes = 10;
        assert!(matches!(
            Logger::new(bad).await,
            Err(crate::Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_constructor_surfaces_directory_error() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("logs");
        std::fs::write(&blocker, "file").unwrap();

        let result = Logger::new(config(&temp_dir)).await;
        assert!(matches!(result, Err(crate::Error::Directory { .. })));
    }

    #[tokio::test]
    async fn test_caller_column_points_at_call_site() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::new(config(&temp_dir)).await.unwrap();
        let path = logger.current_file().unwrap();

        logger.warn("from the test");
        crate::error!(logger, "formatted {}", 42);
        logger.flush().await.unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[WARN]: "));
        assert!(lines[0].contains("logger.rs:"));
        assert!(lines[0].ends_with(" from the test"));
        assert!(lines[1].contains("quill_core::logger::tests()"));
        assert!(lines[1].ends_with(" formatted 42"));
    }

    #[tokio::test]
    async fn test_manual_clock_drives_rotation() {
        let temp_dir = TempDir::new().unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 31, 23, 58, 0).unwrap());
        let logger = Logger::builder(
            LogConfig::builder()
                .log_dir(temp_dir.path())
                .file_prefix("m-")
                .time_interval(TimeInterval::Monthly)
                .handle_signals(false)
                .build()
                .unwrap(),
        )
        .clock(clock.clone())
        .build()
        .await
        .unwrap();

        logger.info("january");
        logger.flush().await.unwrap();
        clock.advance(Duration::minutes(5));
        logger.info("february");
        logger.flush().await.unwrap();

        let current = logger.current_file().unwrap();
        assert_eq!(
            current.file_name().unwrap(),
            "m-2024-02-01T00:03:00.log"
        );
        assert!(temp_dir.path().join("m-2024-01-31T23:58:00.log").exists());
        assert_eq!(logger.stats().rotations, 1);
    }

    #[tokio::test]
    async fn test_shutdown_then_log_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::new(config(&temp_dir)).await.unwrap();

        assert!(logger.shutdown().await.unwrap());
        assert_eq!(logger.shutdown_state(), ShutdownState::Closed);
        assert!(matches!(
            logger.log(LogLevel::Error, "after close"),
            Err(crate::Error::Closed)
        ));
        // Fire-and-forget API stays silent
        logger.error("ignored");
        assert!(!logger.shutdown().await.unwrap());
    }
}
