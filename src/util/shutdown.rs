//! Graceful shutdown coordination for the HTTP server and the upto sweeper.

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Listens for SIGTERM/SIGINT and triggers a shared [`CancellationToken`].
///
/// The HTTP server and the [`crate::session::sweeper::UptoSweeper`] both
/// watch clones of the same token so the process drains in-flight
/// settlements before the axum listener (and the sweeper loop) exit.
pub struct ShutdownSignal {
    _task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl ShutdownSignal {
    pub fn try_new() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let inner = CancellationToken::new();
        let outer = inner.clone();
        let task_tracker = TaskTracker::new();
        task_tracker.spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => inner.cancel(),
                _ = sigint.recv() => inner.cancel(),
            }
        });
        task_tracker.close();
        Ok(Self {
            _task_tracker: task_tracker,
            cancellation_token: outer,
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
