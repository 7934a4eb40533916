//! Top-level wiring: discovery, persistence, the live board and every
//! match session share one book and one registry.

use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::PageExtractor;
use crate::config::AppConfig;
use crate::coordination::{GracefulShutdown, Wakeup};
use crate::domain::CloseReason;
use crate::error::{Result, WatchError};
use crate::persistence::{PersistenceService, SnapshotWriter};
use crate::services::{
    DiscoveryService, LiveBoard, MatchBook, Metrics, SessionContext, SessionRegistry,
};

pub struct CornerMonitor {
    cfg: AppConfig,
    sessions: SessionContext,
    writer: SnapshotWriter,
    board: Arc<LiveBoard>,
    archive: Wakeup,
    shutdown: Arc<GracefulShutdown>,
}

impl CornerMonitor {
    pub fn new(cfg: AppConfig, extractor: Arc<dyn PageExtractor>) -> Self {
        let metrics = Arc::new(Metrics::new());
        let book = MatchBook::new();
        let registry = SessionRegistry::new(
            extractor.clone(),
            metrics.clone(),
            cfg.session.call_timeout(),
        );
        let board_wake = Wakeup::new();

        let sessions = SessionContext {
            extractor,
            registry: registry.clone(),
            book: book.clone(),
            flush: Wakeup::new(),
            board: board_wake.clone(),
            metrics: metrics.clone(),
            cfg: cfg.session.clone(),
        };
        let writer = SnapshotWriter::new(book.clone(), &cfg.persistence, metrics);
        let board = Arc::new(LiveBoard::new(book, registry, board_wake));
        let shutdown = Arc::new(GracefulShutdown::new(&cfg.shutdown));

        Self {
            cfg,
            sessions,
            writer,
            board,
            archive: Wakeup::new(),
            shutdown,
        }
    }

    /// Handle used to request shutdown (signal handlers, tests)
    pub fn shutdown_handle(&self) -> Arc<GracefulShutdown> {
        self.shutdown.clone()
    }

    pub fn book(&self) -> &MatchBook {
        &self.sessions.book
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.sessions.registry
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.sessions.metrics.clone()
    }

    /// Run until shutdown is requested, then drain.
    ///
    /// Returns an error only when the drain itself failed.
    pub async fn run(&self) -> Result<()> {
        info!(
            extractor = self.sessions.extractor.version(),
            output = %self.cfg.persistence.output_path.display(),
            "corner monitor starting"
        );

        let discovery = Arc::new(DiscoveryService::new(
            self.sessions.clone(),
            self.cfg.discovery.clone(),
            &self.cfg.source,
            self.archive.clone(),
        ));
        let persistence = PersistenceService::new(
            self.writer.clone(),
            &self.cfg.persistence,
            self.sessions.flush.clone(),
            self.archive.clone(),
        );

        let discovery_rx = self.shutdown.subscribe();
        let persistence_rx = self.shutdown.subscribe();
        let board_rx = self.shutdown.subscribe();

        let discovery_task = tokio::spawn(async move { discovery.run_forever(discovery_rx).await });
        let persistence_task =
            tokio::spawn(async move { persistence.run_forever(persistence_rx).await });
        let board = self.board.clone();
        let board_task = tokio::spawn(async move { board.run_forever(board_rx).await });

        self.shutdown.wait_for_request().await;

        let registry = self.sessions.registry.clone();
        let writer = self.writer.clone();
        let result = self
            .shutdown
            .execute(
                move || {
                    async move {
                        if let Err(e) = discovery_task.await {
                            warn!("discovery task ended abnormally: {e}");
                        }
                    }
                    .boxed()
                },
                move || async move { registry.teardown_all(CloseReason::Shutdown).await }.boxed(),
                move || {
                    async move {
                        let flushed = writer.flush().await.map_err(|e| e.to_string());
                        let archived = writer.write_archive().await.map_err(|e| e.to_string());
                        flushed.and(archived).map(|_| ())
                    }
                    .boxed()
                },
            )
            .await;

        let drain = Duration::from_secs(self.cfg.shutdown.drain_timeout_secs);
        for (name, task) in [("persistence", persistence_task), ("board", board_task)] {
            if tokio::time::timeout(drain, task).await.is_err() {
                warn!("{name} task did not stop within the drain timeout");
            }
        }

        self.board.log_final_summary().await;
        info!("{}", self.sessions.metrics.summary());

        result.map_err(|e| WatchError::Internal(e.to_string()))
    }
}
