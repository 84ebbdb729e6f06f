//! Ordered, single-writer pipeline from callers to the active file
//!
//! Every caller holds a cloneable [`WriteSerializer`] that pushes commands
//! into one unbounded channel. A single writer owns the [`FileHandleManager`]
//! and applies the commands in channel order, so writes and rotations never
//! overlap and records appear in the order `submit` was called.
//!
//! The writer runs on its own thread with a private current-thread runtime.
//! It keeps draining after the caller's runtime has shut down, and joining
//! the thread is enough to know the file is closed.

use crate::{
    clock::Clock, file::FileHandleManager, format::LineFormatter, rotation::RotationPolicy, Error,
    LogLevel, LogRecord, Result,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};

const WRITER_THREAD_NAME: &str = "quill-writer";

/// Runs on the writer thread once the file is closed
type CloseHook = Box<dyn FnOnce(Result<()>) + Send>;

enum Command {
    Write(LogRecord),
    Flush(oneshot::Sender<Result<()>>),
    Close(CloseHook),
}

/// Writer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub records_written: u64,
    pub bytes_written: u64,
    pub rotations: u64,
    pub rotation_checks: u64,
    pub write_errors: u64,
    pub records_filtered: u64,
}

#[derive(Debug, Default)]
struct Counters {
    records_written: AtomicU64,
    bytes_written: AtomicU64,
    rotations: AtomicU64,
    rotation_checks: AtomicU64,
    write_errors: AtomicU64,
    records_filtered: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> WriterStats {
        WriterStats {
            records_written: self.records_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            rotation_checks: self.rotation_checks.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            records_filtered: self.records_filtered.load(Ordering::Relaxed),
        }
    }
}

/// Submission handle for the writer thread
#[derive(Clone)]
pub struct WriteSerializer {
    sender: mpsc::UnboundedSender<Command>,
    min_level: LogLevel,
    counters: Arc<Counters>,
    current_file: Arc<RwLock<Option<PathBuf>>>,
}

impl WriteSerializer {
    /// Start the writer thread
    pub fn spawn(
        manager: FileHandleManager,
        policy: RotationPolicy,
        formatter: Arc<dyn LineFormatter>,
        clock: Arc<dyn Clock>,
        min_level: LogLevel,
    ) -> Result<(Self, JoinHandle<()>)> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let current_file = Arc::new(RwLock::new(
            manager.active().map(|active| active.path().to_path_buf()),
        ));

        let writer = Writer {
            manager,
            policy,
            formatter,
            clock,
            counters: Arc::clone(&counters),
            current_file: Arc::clone(&current_file),
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let handle = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(writer.run(receiver)))?;

        Ok((
            Self {
                sender,
                min_level,
                counters,
                current_file,
            },
            handle,
        ))
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Level gate applied before any other work; rejected levels are counted
    pub fn admit(&self, level: LogLevel) -> bool {
        let admitted = self.min_level.allows(level);
        if !admitted {
            self.counters.records_filtered.fetch_add(1, Ordering::Relaxed);
        }
        admitted
    }

    /// Queue a record. Never waits for I/O.
    ///
    /// Records below the minimum level are dropped here, before any
    /// formatting, rotation check or I/O.
    pub fn submit(&self, record: LogRecord) -> Result<()> {
        if !self.admit(record.level()) {
            return Ok(());
        }

        self.sender
            .send(Command::Write(record))
            .map_err(|_| Error::Closed)
    }

    /// Wait until everything submitted so far is written and synced
    pub async fn flush(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.sender
            .send(Command::Flush(reply))
            .map_err(|_| Error::Closed)?;
        done.await.map_err(|_| Error::Closed)?
    }

    /// Drain the queue, sync and close the active file, and stop the writer.
    /// Closing an already closed writer is a no-op.
    pub async fn close(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        let queued = self.close_with(move |result| {
            let _ = reply.send(result);
        });
        if !queued {
            return Ok(());
        }
        done.await.unwrap_or(Ok(()))
    }

    /// Ask the writer to drain and close without waiting for it.
    ///
    /// `on_closed` runs on the writer thread after the file is closed, even
    /// if nobody is waiting any more. Returns `false` when the writer had
    /// already stopped; `on_closed` is then never called.
    pub fn close_with(&self, on_closed: impl FnOnce(Result<()>) + Send + 'static) -> bool {
        self.sender.send(Command::Close(Box::new(on_closed))).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn stats(&self) -> WriterStats {
        self.counters.snapshot()
    }

    /// Path of the file currently receiving writes
    pub fn current_file(&self) -> Option<PathBuf> {
        self.current_file
            .read()
            .map(|path| path.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

struct Writer {
    manager: FileHandleManager,
    policy: RotationPolicy,
    formatter: Arc<dyn LineFormatter>,
    clock: Arc<dyn Clock>,
    counters: Arc<Counters>,
    current_file: Arc<RwLock<Option<PathBuf>>>,
}

impl Writer {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = receiver.recv().await {
            match command {
                Command::Write(record) => self.write_record(record).await,
                Command::Flush(reply) => {
                    let _ = reply.send(self.manager.sync().await);
                }
                Command::Close(on_closed) => {
                    // Refuse new submissions, then drain what is already queued
                    receiver.close();
                    let mut pending_replies = vec![on_closed];
                    while let Some(command) = receiver.recv().await {
                        match command {
                            Command::Write(record) => self.write_record(record).await,
                            Command::Flush(reply) => {
                                let _ = reply.send(self.manager.sync().await);
                            }
                            Command::Close(on_closed) => pending_replies.push(on_closed),
                        }
                    }

                    let result = self.close_file().await;
                    for on_closed in pending_replies {
                        on_closed(match &result {
                            Ok(()) => Ok(()),
                            Err(e) => Err(Error::Write {
                                message: format!("close failed: {}", e),
                            }),
                        });
                    }
                    return;
                }
            }
        }

        // Every handle was dropped without an explicit close
        if let Err(e) = self.close_file().await {
            tracing::error!(
                quill.event = "log_close_failed",
                error = %e,
                "Failed to close log file"
            );
        }
    }

    async fn close_file(&mut self) -> Result<()> {
        let result = self.manager.close().await;
        self.publish_current_file();
        result
    }

    fn publish_current_file(&self) {
        let path = self.manager.active().map(|a| a.path().to_path_buf());
        match self.current_file.write() {
            Ok(mut current) => *current = path,
            Err(e) => *e.into_inner() = path,
        }
    }

    fn record_failure(&self, event: &'static str, error: &Error) {
        self.counters.write_errors.fetch_add(1, Ordering::Relaxed);
        tracing::error!(quill.event = event, error = %error, "Log record dropped");
    }

    async fn write_record(&mut self, record: LogRecord) {
        let line = self.formatter.format(&record);
        let pending = line.len() as u64;
        let now = self.clock.now();

        // A previous open or rotation failed; try again before giving up on this record
        if !self.manager.is_open() {
            let reopened = self.manager.open_new(now).await.map(|_| ());
            self.publish_current_file();
            if let Err(e) = reopened {
                self.record_failure("log_open_failed", &e);
                return;
            }
        }

        self.counters.rotation_checks.fetch_add(1, Ordering::Relaxed);
        let rotate = self
            .manager
            .active()
            .is_some_and(|active| self.policy.should_rotate(active, pending, now));

        if rotate {
            let rotated = self.manager.rotate(now).await.map(|_| ());
            self.publish_current_file();
            match rotated {
                Ok(()) => {
                    self.counters.rotations.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.record_failure("log_rotation_failed", &e);
                    return;
                }
            }
        }

        match self.manager.write(line.as_bytes()).await {
            Ok(()) => {
                self.counters.records_written.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .bytes_written
                    .fetch_add(pending, Ordering::Relaxed);
            }
            Err(e) => {
                // The handle may hold a partial line; the next record opens a fresh file
                self.manager.discard();
                self.publish_current_file();
                self.record_failure("log_write_failed", &e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{RollingConfig, TimeInterval};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::path::Path;
    use tempfile::TempDir;

    /// Emits the message verbatim so line sizes are exact
    struct RawFormatter;

    impl LineFormatter for RawFormatter {
        fn format(&self, record: &LogRecord) -> String {
            format!("{}\n", record.message())
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 10, 15, 0).unwrap()
    }

    async fn spawn_writer(
        dir: &TempDir,
        clock: &ManualClock,
        interval: TimeInterval,
        max_bytes: u64,
        min_level: LogLevel,
    ) -> WriteSerializer {
        let mut manager = FileHandleManager::new(dir.path(), "w-");
        manager.open_new(clock.now()).await.unwrap();
        let policy = RotationPolicy::new(RollingConfig {
            time_interval: interval,
            max_bytes,
        });
        let (serializer, _writer) = WriteSerializer::spawn(
            manager,
            policy,
            Arc::new(RawFormatter),
            Arc::new(clock.clone()),
            min_level,
        )
        .unwrap();
        serializer
    }

    fn record(level: LogLevel, message: &str) -> LogRecord {
        LogRecord::new(start(), level, "test", message)
    }

    #[tokio::test]
    async fn test_filtered_records_cost_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let clock = ManualClock::new(start());
        let serializer =
            spawn_writer(&temp_dir, &clock, TimeInterval::Yearly, 1_000, LogLevel::Warn).await;

        serializer.submit(record(LogLevel::Debug, "hidden")).unwrap();
        serializer.submit(record(LogLevel::Info, "hidden")).unwrap();
        serializer.flush().await.unwrap();

        let stats = serializer.stats();
        assert_eq!(stats.records_filtered, 2);
        assert_eq!(stats.rotation_checks, 0);
        assert_eq!(stats.bytes_written, 0);

        let path = serializer.current_file().unwrap();
        assert_eq!(std::fs::metadata(path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_time_boundary_rotates_on_next_record() {
        let temp_dir = TempDir::new().unwrap();
        let clock = ManualClock::new(start());
        let serializer =
            spawn_writer(&temp_dir, &clock, TimeInterval::Hourly, 1_000_000, LogLevel::Debug)
                .await;

        serializer.submit(record(LogLevel::Info, "before")).unwrap();
        serializer.flush().await.unwrap();
        let first = serializer.current_file().unwrap();

        clock.advance(Duration::minutes(50));
        serializer.submit(record(LogLevel::Info, "after")).unwrap();
        serializer.flush().await.unwrap();
        let second = serializer.current_file().unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read_to_string(first).unwrap(), "before\n");
        assert_eq!(std::fs::read_to_string(second).unwrap(), "after\n");
        assert_eq!(serializer.stats().rotations, 1);
    }

    #[tokio::test]
    async fn test_close_drains_and_rejects_later_records() {
        let temp_dir = TempDir::new().unwrap();
        let clock = ManualClock::new(start());
        let serializer =
            spawn_writer(&temp_dir, &clock, TimeInterval::Yearly, 1_000_000, LogLevel::Debug)
                .await;
        let path = serializer.current_file().unwrap();

        for i in 0..100 {
            serializer
                .submit(record(LogLevel::Info, &format!("line {}", i)))
                .unwrap();
        }
        serializer.close().await.unwrap();

        assert!(serializer.is_closed());
        assert!(serializer.current_file().is_none());
        assert!(matches!(
            serializer.submit(record(LogLevel::Error, "too late")),
            Err(Error::Closed)
        ));
        assert!(matches!(serializer.flush().await, Err(Error::Closed)));
        serializer.close().await.unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 100);
        assert_eq!(content.lines().last(), Some("line 99"));
    }

    #[tokio::test]
    async fn test_failed_rotation_recovers_on_next_record() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("logs");
        let clock = ManualClock::new(start());

        let mut manager = FileHandleManager::new(&log_dir, "w-");
        manager.open_new(clock.now()).await.unwrap();
        let (serializer, _writer) = WriteSerializer::spawn(
            manager,
            RotationPolicy::new(RollingConfig {
                time_interval: TimeInterval::Yearly,
                max_bytes: 100,
            }),
            Arc::new(RawFormatter),
            Arc::new(clock.clone()),
            LogLevel::Debug,
        )
        .unwrap();

        let line = "x".repeat(59);
        serializer.submit(record(LogLevel::Info, &line)).unwrap();
        serializer.flush().await.unwrap();

        // Replace the directory with a file so the rotation cannot open a new file
        std::fs::remove_dir_all(&log_dir).unwrap();
        std::fs::write(&log_dir, "blocked").unwrap();

        serializer.submit(record(LogLevel::Info, &line)).unwrap();
        serializer.flush().await.unwrap();
        assert_eq!(serializer.stats().write_errors, 1);
        assert!(serializer.current_file().is_none());

        std::fs::remove_file(&log_dir).unwrap();
        serializer.submit(record(LogLevel::Info, &line)).unwrap();
        serializer.flush().await.unwrap();

        let stats = serializer.stats();
        assert_eq!(stats.records_written, 2);
        let current = serializer.current_file().unwrap();
        assert_eq!(std::fs::read_to_string(current).unwrap(), format!("{}\n", line));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_failed_append_drops_record_and_next_one_lands() {
        let temp_dir = TempDir::new().unwrap();
        let clock = ManualClock::new(start());

        // Every append to /dev/full fails with ENOSPC
        let mut manager = FileHandleManager::new(temp_dir.path(), "w-");
        manager
            .attach(Path::new("/dev/full"), clock.now())
            .await
            .unwrap();
        let (serializer, _writer) = WriteSerializer::spawn(
            manager,
            RotationPolicy::new(RollingConfig {
                time_interval: TimeInterval::Yearly,
                max_bytes: 1_000_000,
            }),
            Arc::new(RawFormatter),
            Arc::new(clock.clone()),
            LogLevel::Debug,
        )
        .unwrap();

        serializer.submit(record(LogLevel::Error, "lost")).unwrap();
        serializer.flush().await.unwrap();
        let stats = serializer.stats();
        assert_eq!(stats.write_errors, 1);
        assert_eq!(stats.records_written, 0);
        assert!(serializer.current_file().is_none());

        serializer.submit(record(LogLevel::Error, "kept")).unwrap();
        serializer.flush().await.unwrap();

        let stats = serializer.stats();
        assert_eq!(stats.write_errors, 1);
        assert_eq!(stats.records_written, 1);
        let current = serializer.current_file().unwrap();
        assert!(current.starts_with(temp_dir.path()));
        assert_eq!(std::fs::read_to_string(current).unwrap(), "kept\n");
    }

    #[tokio::test]
    async fn test_close_hook_runs_after_file_is_closed() {
        let temp_dir = TempDir::new().unwrap();
        let clock = ManualClock::new(start());
        let serializer =
            spawn_writer(&temp_dir, &clock, TimeInterval::Yearly, 1_000_000, LogLevel::Debug)
                .await;
        let path = serializer.current_file().unwrap();

        serializer.submit(record(LogLevel::Info, "queued")).unwrap();
        let (seen_tx, seen_rx) = oneshot::channel();
        let written_path = path.clone();
        assert!(serializer.close_with(move |result| {
            let content = std::fs::read_to_string(written_path).unwrap_or_default();
            let _ = seen_tx.send((result.is_ok(), content));
        }));

        let (ok, content) = seen_rx.await.unwrap();
        assert!(ok);
        assert_eq!(content, "queued\n");
        assert!(serializer.current_file().is_none());
        assert!(!serializer.close_with(|_| {}));
    }
}
