//! Graceful Shutdown Handler
//!
//! Drains the monitor in order on SIGINT/SIGTERM: stop discovery, tear down
//! every session (which releases its page), then write the final snapshot
//! and archive. Each phase is bounded by the configured drain timeout.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::config::ShutdownConfig;

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM, SIGINT
    Graceful,
    /// Sender dropped without a request
    Emergency,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Emergency => write!(f, "emergency"),
        }
    }
}

/// Shutdown phase tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Not shutting down
    Running,
    StoppingDiscovery,
    /// Tearing down sessions and releasing their pages
    ClosingSessions,
    /// Writing the last snapshot and archive
    FinalFlush,
    Complete,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPhase::Running => write!(f, "running"),
            ShutdownPhase::StoppingDiscovery => write!(f, "stopping_discovery"),
            ShutdownPhase::ClosingSessions => write!(f, "closing_sessions"),
            ShutdownPhase::FinalFlush => write!(f, "final_flush"),
            ShutdownPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Graceful shutdown coordinator
pub struct GracefulShutdown {
    drain_timeout: Duration,
    shutdown_requested: AtomicBool,
    phase: watch::Sender<ShutdownPhase>,
    phase_rx: watch::Receiver<ShutdownPhase>,
    signal_tx: broadcast::Sender<ShutdownSignal>,
}

impl GracefulShutdown {
    pub fn new(config: &ShutdownConfig) -> Self {
        let (phase, phase_rx) = watch::channel(ShutdownPhase::Running);
        let (signal_tx, _) = broadcast::channel(8);

        Self {
            drain_timeout: Duration::from_secs(config.drain_timeout_secs),
            shutdown_requested: AtomicBool::new(false),
            phase,
            phase_rx,
            signal_tx,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&ShutdownConfig::default())
    }

    /// Subscribe to shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.signal_tx.subscribe()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn current_phase(&self) -> ShutdownPhase {
        *self.phase_rx.borrow()
    }

    /// Request shutdown; duplicates are ignored
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        let _ = self.signal_tx.send(signal);
    }

    /// Resolves once shutdown has been requested
    pub async fn wait_for_request(&self) {
        let mut rx = self.signal_tx.subscribe();
        if self.is_shutdown_requested() {
            return;
        }
        let _ = rx.recv().await;
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        let _ = self.phase.send(phase);
        info!("Shutdown phase: {}", phase);
    }

    /// Execute the drain sequence.
    ///
    /// 1. Stop discovery so no new session starts
    /// 2. Tear down every session; returns how many were closed
    /// 3. Write the final snapshot and archive
    pub async fn execute<F1, F2, F3>(
        &self,
        stop_discovery: F1,
        close_sessions: F2,
        final_flush: F3,
    ) -> Result<(), ShutdownError>
    where
        F1: FnOnce() -> BoxFuture<'static, ()>,
        F2: FnOnce() -> BoxFuture<'static, usize>,
        F3: FnOnce() -> BoxFuture<'static, Result<(), String>>,
    {
        let start = std::time::Instant::now();
        let mut timed_out = false;
        info!(
            "Starting graceful shutdown (phase timeout: {}s)",
            self.drain_timeout.as_secs()
        );

        self.set_phase(ShutdownPhase::StoppingDiscovery);
        if tokio::time::timeout(self.drain_timeout, stop_discovery())
            .await
            .is_err()
        {
            warn!("Discovery did not stop within the drain timeout");
            timed_out = true;
        }

        self.set_phase(ShutdownPhase::ClosingSessions);
        match tokio::time::timeout(self.drain_timeout, close_sessions()).await {
            Ok(closed) => info!("Closed {} sessions", closed),
            Err(_) => {
                warn!(
                    "Session teardown timeout after {}s, proceeding anyway",
                    self.drain_timeout.as_secs()
                );
                timed_out = true;
            }
        }

        self.set_phase(ShutdownPhase::FinalFlush);
        match tokio::time::timeout(self.drain_timeout, final_flush()).await {
            Ok(Ok(())) => debug!("Final flush written"),
            Ok(Err(e)) => {
                error!("Final flush failed: {}", e);
                self.set_phase(ShutdownPhase::Complete);
                return Err(ShutdownError::ComponentFailed(format!("final flush: {e}")));
            }
            Err(_) => {
                error!(
                    "Final flush timeout after {}s",
                    self.drain_timeout.as_secs()
                );
                timed_out = true;
            }
        }

        self.set_phase(ShutdownPhase::Complete);
        info!("Graceful shutdown completed in {:?}", start.elapsed());

        if timed_out {
            Err(ShutdownError::Timeout)
        } else {
            Ok(())
        }
    }
}

/// Shutdown errors
#[derive(Debug, Clone)]
pub enum ShutdownError {
    /// A drain phase exceeded its timeout
    Timeout,
    ComponentFailed(String),
}

impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownError::Timeout => write!(f, "shutdown timed out"),
            ShutdownError::ComponentFailed(c) => write!(f, "{} failed during shutdown", c),
        }
    }
}

impl std::error::Error for ShutdownError {}

/// Helper to install OS signal handlers
pub fn install_signal_handlers(shutdown: Arc<GracefulShutdown>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, name) in [
            (SignalKind::terminate(), "SIGTERM"),
            (SignalKind::interrupt(), "SIGINT"),
        ] {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut stream = match signal(kind) {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("Failed to install {} handler: {}", name, e);
                        return;
                    }
                };
                stream.recv().await;
                info!("Received {}", name);
                shutdown.request_shutdown(ShutdownSignal::Graceful);
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                return;
            }
            info!("Received Ctrl+C");
            shutdown.request_shutdown(ShutdownSignal::Graceful);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_shutdown_phase_display() {
        assert_eq!(ShutdownPhase::Running.to_string(), "running");
        assert_eq!(ShutdownPhase::ClosingSessions.to_string(), "closing_sessions");
        assert_eq!(ShutdownPhase::Complete.to_string(), "complete");
    }

    #[tokio::test]
    async fn test_shutdown_request() {
        let shutdown = GracefulShutdown::with_defaults();
        let mut rx = shutdown.subscribe();

        assert!(!shutdown.is_shutdown_requested());
        shutdown.request_shutdown(ShutdownSignal::Graceful);
        assert!(shutdown.is_shutdown_requested());
        assert_eq!(rx.recv().await.unwrap(), ShutdownSignal::Graceful);

        // Duplicate request is ignored
        shutdown.request_shutdown(ShutdownSignal::Graceful);
        assert!(rx.try_recv().is_err());

        // Already requested: returns immediately
        shutdown.wait_for_request().await;
    }

    #[tokio::test]
    async fn test_execute_runs_phases_in_order() {
        let shutdown = GracefulShutdown::with_defaults();
        let order = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = (order.clone(), order.clone(), order.clone());
        let result = shutdown
            .execute(
                move || async move { assert_eq!(a.fetch_add(1, Ordering::SeqCst), 0) }.boxed(),
                move || {
                    async move {
                        assert_eq!(b.fetch_add(1, Ordering::SeqCst), 1);
                        3
                    }
                    .boxed()
                },
                move || {
                    async move {
                        assert_eq!(c.fetch_add(1, Ordering::SeqCst), 2);
                        Ok(())
                    }
                    .boxed()
                },
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(order.load(Ordering::SeqCst), 3);
        assert_eq!(shutdown.current_phase(), ShutdownPhase::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_phase_times_out() {
        let shutdown = GracefulShutdown::new(&ShutdownConfig {
            drain_timeout_secs: 1,
        });

        let result = shutdown
            .execute(
                || async {}.boxed(),
                || futures::future::pending::<usize>().boxed(),
                || async { Ok(()) }.boxed(),
            )
            .await;

        assert!(matches!(result, Err(ShutdownError::Timeout)));
        assert_eq!(shutdown.current_phase(), ShutdownPhase::Complete);
    }
}
