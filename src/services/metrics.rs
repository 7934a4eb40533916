use crate::domain::CloseReason;
use std::sync::atomic::{AtomicU64, Ordering};

/// Runtime counters for observability
#[derive(Debug, Default)]
pub struct Metrics {
    pub sessions_started: AtomicU64,
    pub closed_no_event_area: AtomicU64,
    pub closed_scoreless: AtomicU64,
    pub closed_vanished: AtomicU64,
    pub closed_fatal: AtomicU64,
    pub closed_shutdown: AtomicU64,
    pub extraction_failures: AtomicU64,
    pub discovery_cycles: AtomicU64,
    pub discovery_failures: AtomicU64,
    pub flushes_ok: AtomicU64,
    pub flushes_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_sessions_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_closed(&self, reason: CloseReason) {
        let counter = match reason {
            CloseReason::NoEventArea => &self.closed_no_event_area,
            CloseReason::ScorelessTimeout => &self.closed_scoreless,
            CloseReason::Vanished => &self.closed_vanished,
            CloseReason::Fatal => &self.closed_fatal,
            CloseReason::Shutdown => &self.closed_shutdown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn closed(&self, reason: CloseReason) -> u64 {
        match reason {
            CloseReason::NoEventArea => &self.closed_no_event_area,
            CloseReason::ScorelessTimeout => &self.closed_scoreless,
            CloseReason::Vanished => &self.closed_vanished,
            CloseReason::Fatal => &self.closed_fatal,
            CloseReason::Shutdown => &self.closed_shutdown,
        }
        .load(Ordering::Relaxed)
    }

    pub fn inc_extraction_failures(&self) {
        self.extraction_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_discovery_cycles(&self) {
        self.discovery_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_discovery_failures(&self) {
        self.discovery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self, ok: bool) {
        if ok {
            self.flushes_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.flushes_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// One-line summary for the shutdown log
    pub fn summary(&self) -> String {
        let closed = CloseReason::ALL
            .iter()
            .map(|r| format!("{}={}", r, self.closed(*r)))
            .collect::<Vec<_>>()
            .join(" ");

        format!(
            "sessions started={} closed[{}] | extraction failures={} | discovery cycles={} failed={} | flushes ok={} failed={}",
            self.sessions_started.load(Ordering::Relaxed),
            closed,
            self.extraction_failures.load(Ordering::Relaxed),
            self.discovery_cycles.load(Ordering::Relaxed),
            self.discovery_failures.load(Ordering::Relaxed),
            self.flushes_ok.load(Ordering::Relaxed),
            self.flushes_failed.load(Ordering::Relaxed),
        )
    }
}
