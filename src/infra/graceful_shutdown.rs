//! Graceful shutdown handling
//!
//! Provides graceful shutdown support for the storage service:
//! - Signal handling (SIGTERM, SIGINT)
//! - In-flight event draining, so every accepted event still reports its outcome
//! - Background task cancellation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// How often draining re-checks the in-flight count
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shutdown signal that can be cloned and shared
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Check if shutdown has been initiated
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal.
    ///
    /// Completes immediately if shutdown already started, or if the
    /// coordinator is gone.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|stopping| *stopping).await;
    }
}

/// Tracks events that are being processed
#[derive(Debug, Default)]
pub struct InFlightTracker {
    active: AtomicU64,
    total: AtomicU64,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event starting. The returned guard can move into a spawned task.
    pub fn track(self: &Arc<Self>) -> InFlightGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn total_count(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Wait until no event is in flight, or the timeout elapses.
    ///
    /// Returns `true` when fully drained.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let start = Instant::now();

        while self.active_count() > 0 {
            if start.elapsed() > timeout {
                warn!(
                    active = self.active_count(),
                    "Timeout waiting for in-flight events to drain"
                );
                return false;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        info!("All in-flight events drained");
        true
    }
}

/// Guard that decrements the in-flight count when dropped
pub struct InFlightGuard {
    tracker: Arc<InFlightTracker>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shutdown coordinator that manages graceful shutdown
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
    in_flight: Arc<InFlightTracker>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
            in_flight: Arc::new(InFlightTracker::new()),
        }
    }

    /// Get a shutdown signal that can be cloned
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn in_flight(&self) -> Arc<InFlightTracker> {
        Arc::clone(&self.in_flight)
    }

    /// Initiate shutdown. Idempotent.
    pub fn shutdown(&self) {
        let started = self.tx.send_if_modified(|stopping| {
            if *stopping {
                false
            } else {
                *stopping = true;
                true
            }
        });

        if started {
            info!("Initiating graceful shutdown...");
        }
    }

    /// Signal shutdown, then wait for in-flight events.
    ///
    /// Returns `true` when every in-flight event finished within `drain_timeout`.
    pub async fn graceful_shutdown(&self, drain_timeout: Duration) -> bool {
        self.shutdown();

        info!(
            active = self.in_flight.active_count(),
            "Waiting for in-flight events to complete..."
        );

        let drained = self.in_flight.wait_for_drain(drain_timeout).await;

        info!(
            drained,
            total = self.in_flight.total_count(),
            "Graceful shutdown complete"
        );
        drained
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete when the process receives SIGINT or SIGTERM.
///
/// If a handler cannot be installed the error is logged and that signal is
/// ignored; the other one still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
