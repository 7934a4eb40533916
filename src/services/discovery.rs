//! Background discovery service: lists live events and keeps the session
//! registry in step with them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, info, warn};

use crate::adapters::PageExtractor;
use crate::config::{DiscoveryConfig, SourceConfig};
use crate::coordination::{ShutdownSignal, Wakeup};
use crate::domain::{CloseReason, EventCandidate};
use crate::error::{with_timeout, Result, WatchError};
use crate::services::session::SessionContext;

/// What one reconciliation cycle changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub added: Vec<String>,
    pub retired: Vec<String>,
    pub kept: usize,
}

impl CycleReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.retired.is_empty()
    }
}

pub struct DiscoveryService {
    extractor: Arc<dyn PageExtractor>,
    sessions: SessionContext,
    cfg: DiscoveryConfig,
    list_timeout: Duration,
    /// Wakes the archive writer after each completed cycle
    cycle_done: Wakeup,
}

impl DiscoveryService {
    pub fn new(
        sessions: SessionContext,
        cfg: DiscoveryConfig,
        source: &SourceConfig,
        cycle_done: Wakeup,
    ) -> Self {
        Self {
            extractor: sessions.extractor.clone(),
            sessions,
            cfg,
            list_timeout: Duration::from_millis(source.list_timeout_ms),
            cycle_done,
        }
    }

    /// Run the discovery loop until shutdown (call from a spawned task).
    ///
    /// The first cycle runs immediately.
    pub async fn run_forever(&self, mut shutdown: broadcast::Receiver<ShutdownSignal>) {
        let interval = Duration::from_secs(self.cfg.refresh_interval_secs);
        info!(
            "DiscoveryService: starting (interval={}s, extractor={})",
            self.cfg.refresh_interval_secs,
            self.extractor.version()
        );

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!("DiscoveryService: cycle skipped, tracked sessions untouched: {e}");
                    }
                }
                signal = shutdown.recv() => {
                    info!("DiscoveryService: stopping ({})", signal.unwrap_or(ShutdownSignal::Emergency));
                    break;
                }
            }
        }
    }

    /// Execute a single discovery cycle.
    ///
    /// A listing failure leaves the registry untouched.
    pub async fn run_once(&self) -> Result<CycleReport> {
        let metrics = &self.sessions.metrics;
        let listed = match with_timeout(
            "list_candidates",
            self.list_timeout,
            self.extractor.list_candidates(),
        )
        .await
        {
            Ok(listed) => listed,
            Err(e) => {
                metrics.inc_discovery_failures();
                return Err(WatchError::Discovery(e.to_string()));
            }
        };
        metrics.inc_discovery_cycles();

        let candidates = self.started_candidates(listed);
        let wanted: BTreeSet<String> = candidates.keys().cloned().collect();
        let tracked = self.sessions.registry.ids().await;

        let mut report = CycleReport::default();
        for id in tracked.difference(&wanted) {
            if self
                .sessions
                .registry
                .teardown(id, CloseReason::Vanished)
                .await
            {
                report.retired.push(id.clone());
            }
        }

        for (id, candidate) in candidates {
            if tracked.contains(&id) {
                report.kept += 1;
                continue;
            }
            // Spawned, not awaited: the session runs on its own task.
            if self.sessions.start_session(candidate).await.is_some() {
                report.added.push(id);
            }
        }

        if report.is_noop() {
            debug!(
                "DiscoveryService: cycle complete, nothing changed ({} tracked)",
                report.kept
            );
        } else {
            info!(
                "DiscoveryService: cycle complete, added {} retired {} kept {}",
                report.added.len(),
                report.retired.len(),
                report.kept
            );
        }

        self.sessions.flush.request();
        self.cycle_done.request();
        Ok(report)
    }

    /// Drop not-yet-started rows and collapse duplicate ids (first row wins)
    fn started_candidates(&self, listed: Vec<EventCandidate>) -> BTreeMap<String, EventCandidate> {
        let mut out = BTreeMap::new();
        for candidate in listed {
            if candidate.id.is_empty() {
                continue;
            }
            if !candidate.has_started(&self.cfg.not_started_markers) {
                debug!(event_id = %candidate.id, status = %candidate.status, "not started, skipped");
                continue;
            }
            out.entry(candidate.id.clone()).or_insert(candidate);
        }
        out
    }
}
