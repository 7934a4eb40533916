//! Live board: a periodic textual summary of every tracked match.
//!
//! Sessions request a refresh through a [`Wakeup`]; the board coalesces
//! bursts of requests and emits one summary per wake-up as tracing events.

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::coordination::{ShutdownSignal, Wakeup};
use crate::services::book::MatchBook;
use crate::services::registry::SessionRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardRow {
    pub id: String,
    pub home: String,
    pub away: String,
    pub score: String,
    pub status: String,
    pub events: usize,
    pub corners: usize,
    /// Whether a session is still monitoring this match
    pub live: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardSummary {
    pub rows: Vec<BoardRow>,
    pub total_events: usize,
    pub total_corners: usize,
}

impl BoardSummary {
    pub fn live_count(&self) -> usize {
        self.rows.iter().filter(|r| r.live).count()
    }
}

pub struct LiveBoard {
    book: MatchBook,
    registry: SessionRegistry,
    refresh: Wakeup,
}

impl LiveBoard {
    pub fn new(book: MatchBook, registry: SessionRegistry, refresh: Wakeup) -> Self {
        Self {
            book,
            registry,
            refresh,
        }
    }

    pub async fn render(&self) -> BoardSummary {
        let live = self.registry.ids().await;
        let mut summary = BoardSummary::default();

        for (id, record) in self.book.snapshot().await {
            let row = BoardRow {
                live: live.contains(&id),
                events: record.ledger.all.len(),
                corners: record.ledger.corners.len(),
                home: record.info.home,
                away: record.info.away,
                score: record.info.score,
                status: record.info.status,
                id,
            };
            summary.total_events += row.events;
            summary.total_corners += row.corners;
            summary.rows.push(row);
        }
        summary
    }

    pub async fn run_forever(&self, mut shutdown: broadcast::Receiver<ShutdownSignal>) {
        loop {
            tokio::select! {
                _ = self.refresh.wait() => {
                    let summary = self.render().await;
                    emit(&summary, false);
                }
                _ = shutdown.recv() => {
                    debug!("LiveBoard: stopping");
                    break;
                }
            }
        }
    }

    pub async fn log_final_summary(&self) {
        let summary = self.render().await;
        emit(&summary, true);
    }
}

fn emit(summary: &BoardSummary, is_final: bool) {
    for row in summary.rows.iter().filter(|r| is_final || r.live) {
        info!(
            event_id = %row.id,
            live = row.live,
            "{} vs {} | {} | {} | events {} | corners {}",
            row.home, row.away, row.score, row.status, row.events, row.corners
        );
    }
    info!(
        matches = summary.rows.len(),
        live = summary.live_count(),
        total_events = summary.total_events,
        total_corners = summary.total_corners,
        "{}",
        if is_final { "final board" } else { "board" }
    );
}
