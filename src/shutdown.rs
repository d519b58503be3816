//! Graceful shutdown glue (SPEC_FULL.md §2 item 8, §4.2, §5 "Cancellation").
//!
//! On a shutdown signal, every per-peer task cancels its timers and stops
//! scheduling new probes; no probe is aborted mid-flight by force — each
//! task observes the shutdown flag only at the suspension points the spec
//! names (after a probe completes, before re-arming a timer).

use tokio::sync::watch;

/// Owns the writable half of the shutdown channel. One [`ShutdownCoordinator`]
/// per [`crate::registry::Registry`]; cloned into every per-peer task as a
/// [`ShutdownSignal`] (the read half).
#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Requests shutdown. Idempotent — later calls are no-ops.
    pub fn shut_down(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits for the process's terminate/interrupt/quit signal and requests
    /// shutdown, mirroring the teacher's `shutdown_coordinator.listen_for_shutdown()`
    /// spawn in `main.rs`. The embedder decides whether to spawn this task at
    /// all — the core never installs a signal handler on its own.
    pub async fn listen_for_os_signal(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => return,
            };
            let mut int = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(_) => return,
            };
            let mut quit = match signal(SignalKind::quit()) {
                Ok(s) => s,
                Err(_) => return,
            };
            tokio::select! {
                _ = term.recv() => {}
                _ = int.recv() => {}
                _ = quit.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        self.shut_down();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Read half of the shutdown channel, cloned into every per-peer scheduler
/// task.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_shutting_down(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested. Used inside
    /// `tokio::select!` alongside a sleep so a task yields immediately on
    /// shutdown instead of waiting out its current timer.
    pub async fn changed(&mut self) {
        // A `watch` channel can only transition `false -> true` here (the
        // coordinator never resets it), so waiting for any change is
        // equivalent to waiting for shutdown specifically.
        if self.is_shutting_down() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}
