//! Signal-driven shutdown
//!
//! `Running -> Draining -> Closed`, entered at most once. The first trigger
//! emits a final critical record, drains the writer and closes the file;
//! every later trigger waits for `Closed` and reports that it did nothing.

use crate::{
    caller::CallSite, clock::Clock, serializer::WriteSerializer, LogLevel, LogRecord, Result,
};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Lifecycle of the logger's output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Closed,
}

/// What started the shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Normal process exit
    Exit,
}

impl ShutdownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownReason::Interrupt => "SIGINT",
            ShutdownReason::Terminate => "SIGTERM",
            ShutdownReason::Exit => "exit",
        }
    }

    /// Conventional exit status: 128 + signal number
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Interrupt => 130,
            ShutdownReason::Terminate => 143,
            ShutdownReason::Exit => 0,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs the shutdown sequence exactly once for one writer
pub struct ShutdownCoordinator {
    state: Arc<watch::Sender<ShutdownState>>,
    serializer: WriteSerializer,
    clock: Arc<dyn Clock>,
}

impl ShutdownCoordinator {
    pub fn new(serializer: WriteSerializer, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state: Arc::new(state),
            serializer,
            clock,
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Start the shutdown sequence.
    ///
    /// Returns `true` when this call performed the shutdown. Calls arriving
    /// while another one is draining wait for it to finish and return `false`.
    /// Dropping the returned future does not stop the drain.
    pub async fn trigger(&self, reason: ShutdownReason) -> Result<bool> {
        let Some(done) = self.begin(reason) else {
            self.wait_closed().await;
            return Ok(false);
        };

        // A dropped reply means the writer had already stopped
        let closed = done.await.unwrap_or(Ok(()));

        tracing::info!(
            quill.event = "shutdown_complete",
            reason = reason.as_str(),
            success = closed.is_ok(),
            "Logger closed"
        );

        closed.map(|_| true)
    }

    /// Start the shutdown sequence without waiting for it.
    ///
    /// Usable outside any runtime. Returns `false` if shutdown had already
    /// begun.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        self.begin(reason).is_some()
    }

    /// Wait until the file is closed
    pub async fn wait_closed(&self) {
        let mut state = self.state.subscribe();
        // The sender lives in `self`, so this only ends once Closed is reached
        let _ = state.wait_for(|s| *s == ShutdownState::Closed).await;
    }

    /// Flip `Running -> Draining`, queue the final record and hand the close
    /// to the writer. The writer publishes `Closed` itself once the file is
    /// closed. `None` if another call got here first.
    fn begin(&self, reason: ShutdownReason) -> Option<oneshot::Receiver<Result<()>>> {
        let mut won = false;
        self.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::Draining;
                won = true;
            }
            won
        });
        if !won {
            return None;
        }

        tracing::info!(
            quill.event = "shutdown_started",
            reason = reason.as_str(),
            "Logger shutting down"
        );

        let site = CallSite::caller().with_module(module_path!());
        let farewell = LogRecord::new(
            self.clock.now(),
            LogLevel::Critical,
            site.render(),
            format!("Logger shutting down. Received signal: {}", reason),
        );
        if let Err(e) = self.serializer.submit(farewell) {
            tracing::warn!(
                quill.event = "shutdown_record_dropped",
                error = %e,
                "Final log record could not be queued"
            );
        }

        let (reply, done) = oneshot::channel();
        let state = Arc::clone(&self.state);
        let queued = self.serializer.close_with(move |result| {
            state.send_replace(ShutdownState::Closed);
            let _ = reply.send(result);
        });
        if !queued {
            self.state.send_replace(ShutdownState::Closed);
        }

        Some(done)
    }

    /// Listen for termination signals in the background.
    ///
    /// The signal listeners are registered before this returns, so a signal
    /// arriving right after construction is already handled. The task only
    /// holds a weak reference, so dropping every logger handle still releases
    /// the writer. With `exit_on_signal` the process exits with `128 + signal`
    /// once the file is closed.
    pub fn install_signal_handlers(
        self: &Arc<Self>,
        exit_on_signal: bool,
    ) -> Result<JoinHandle<()>> {
        let mut signals = TerminationSignals::register()?;
        let coordinator: Weak<Self> = Arc::downgrade(self);

        Ok(tokio::spawn(async move {
            let reason = signals.recv().await;

            tracing::info!(
                quill.event = "signal_received",
                signal = reason.as_str(),
                "Received termination signal"
            );

            if let Some(coordinator) = coordinator.upgrade() {
                if let Err(e) = coordinator.trigger(reason).await {
                    tracing::error!(
                        quill.event = "shutdown_failed",
                        error = %e,
                        "Failed to close log file during shutdown"
                    );
                }
            }

            if exit_on_signal {
                std::process::exit(reason.exit_code());
            }
        }))
    }
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(unix)]
struct TerminationSignals {
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl TerminationSignals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(&mut self) -> ShutdownReason {
        tokio::select! {
            _ = self.terminate.recv() => ShutdownReason::Terminate,
            _ = self.interrupt.recv() => ShutdownReason::Interrupt,
        }
    }
}

#[cfg(windows)]
struct TerminationSignals {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(windows)]
impl TerminationSignals {
    fn register() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    async fn recv(&mut self) -> ShutdownReason {
        self.ctrl_c.recv().await;
        ShutdownReason::Interrupt
    }
}
