//! Periodic and on-demand flushing of the match book to disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::coordination::{ShutdownSignal, Wakeup};
use crate::error::Result;
use crate::persistence::snapshot::{build_archive, CornerSnapshot, SideMarkers};
use crate::persistence::writer::write_json_atomic;
use crate::services::book::MatchBook;
use crate::services::metrics::Metrics;

/// Serializes the book to the corner snapshot and the event archive.
///
/// Writes are serialized so two flushes never race on the same temp file.
#[derive(Clone)]
pub struct SnapshotWriter {
    book: MatchBook,
    output_path: PathBuf,
    archive_path: PathBuf,
    markers: SideMarkers,
    metrics: Arc<Metrics>,
    write_lock: Arc<Mutex<()>>,
}

impl SnapshotWriter {
    pub fn new(book: MatchBook, cfg: &PersistenceConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            book,
            output_path: cfg.output_path.clone(),
            archive_path: cfg.archive_path.clone(),
            markers: SideMarkers {
                home: cfg.home_marker.clone(),
                away: cfg.away_marker.clone(),
            },
            metrics,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Write the full corner snapshot; returns the number of matches written
    pub async fn flush(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let records = self.book.snapshot().await;
        let snapshot = CornerSnapshot::build(&records, &self.markers);

        let result = write_json_atomic(&self.output_path, &snapshot).await;
        self.metrics.record_flush(result.is_ok());
        result?;

        debug!(
            matches = snapshot.total_matches,
            corners = snapshot.total_corners,
            "snapshot flushed to {}",
            self.output_path.display()
        );
        Ok(snapshot.total_matches)
    }

    /// Write the all-event archive
    pub async fn write_archive(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let archive = build_archive(&self.book.snapshot().await);
        write_json_atomic(&self.archive_path, &archive).await?;
        debug!(
            matches = archive.len(),
            "archive written to {}",
            self.archive_path.display()
        );
        Ok(archive.len())
    }
}

/// Flushes on a fixed interval and whenever a session requests it
pub struct PersistenceService {
    writer: SnapshotWriter,
    interval: Duration,
    flush: Wakeup,
    archive: Wakeup,
}

impl PersistenceService {
    pub fn new(
        writer: SnapshotWriter,
        cfg: &PersistenceConfig,
        flush: Wakeup,
        archive: Wakeup,
    ) -> Self {
        Self {
            writer,
            interval: Duration::from_secs(cfg.flush_interval_secs),
            flush,
            archive,
        }
    }

    pub async fn run_forever(&self, mut shutdown: broadcast::Receiver<ShutdownSignal>) {
        info!(
            "PersistenceService: starting (interval={}s)",
            self.interval.as_secs()
        );
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush_logged().await,
                _ = self.flush.wait() => self.flush_logged().await,
                _ = self.archive.wait() => {
                    if let Err(e) = self.writer.write_archive().await {
                        warn!("PersistenceService: archive write failed: {e}");
                    }
                }
                _ = shutdown.recv() => {
                    info!("PersistenceService: stopping");
                    break;
                }
            }
        }
    }

    async fn flush_logged(&self) {
        // in-memory state is untouched; the next trigger retries
        if let Err(e) = self.writer.flush().await {
            warn!("PersistenceService: flush failed: {e}");
        }
    }
}
