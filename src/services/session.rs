//! Per-match monitoring session.
//!
//! `DISCOVERED -> ACTIVE -> CLOSING -> CLOSED`. A session polls its page on a
//! fixed period, merges what it sees into the [`MatchBook`] and retires itself
//! on one of two policies (no event area after a grace delay, or a score
//! stuck at the no-score sentinel for too long). Discovery may tear the same
//! session down concurrently; both paths end in the registry's idempotent
//! teardown.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::adapters::PageExtractor;
use crate::config::SessionConfig;
use crate::coordination::Wakeup;
use crate::domain::{normalize_score, CloseReason, EventCandidate, SessionState};
use crate::error::{with_timeout, Result, WatchError};
use crate::services::book::MatchBook;
use crate::services::metrics::Metrics;
use crate::services::registry::{SessionLink, SessionRegistry};

const COUNTDOWN_LOG_EVERY: Duration = Duration::from_secs(30);

/// Shared handles every session needs
#[derive(Clone)]
pub struct SessionContext {
    pub extractor: Arc<dyn PageExtractor>,
    pub registry: SessionRegistry,
    pub book: MatchBook,
    /// Wakes the persistence service for an immediate flush
    pub flush: Wakeup,
    /// Wakes the live board
    pub board: Wakeup,
    pub metrics: Arc<Metrics>,
    pub cfg: SessionConfig,
}

impl SessionContext {
    /// Register `candidate` and spawn its session; `None` if already monitored
    pub async fn start_session(&self, candidate: EventCandidate) -> Option<JoinHandle<CloseReason>> {
        let link = self.registry.register(&candidate).await?;
        Some(MatchSession::new(self.clone(), link, candidate).spawn())
    }
}

/// Outcome of feeding one score sample to the zero-score timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroScoreStatus {
    /// Not at the sentinel, nothing running
    Idle,
    Started,
    Running { remaining: Duration },
    /// Score moved off the sentinel; timer cancelled
    Reset,
    Expired,
}

/// Monotonic deadline for the "still scoreless" policy.
///
/// Empty samples are ignored so a failed or partial extraction neither
/// starts nor cancels the timer.
#[derive(Debug, Clone)]
pub struct ZeroScoreTimer {
    sentinel: String,
    limit: Duration,
    started: Option<Instant>,
    reported: u64,
}

impl ZeroScoreTimer {
    pub fn new(sentinel: &str, limit: Duration) -> Self {
        Self {
            sentinel: normalize_score(sentinel),
            limit,
            started: None,
            reported: 0,
        }
    }

    pub fn observe(&mut self, score: &str, now: Instant) -> ZeroScoreStatus {
        let score = normalize_score(score);
        if score.is_empty() {
            return match self.started {
                Some(started) => ZeroScoreStatus::Running {
                    remaining: self.limit.saturating_sub(now.duration_since(started)),
                },
                None => ZeroScoreStatus::Idle,
            };
        }

        if score != self.sentinel {
            self.reported = 0;
            return match self.started.take() {
                Some(_) => ZeroScoreStatus::Reset,
                None => ZeroScoreStatus::Idle,
            };
        }

        match self.started {
            None => {
                self.started = Some(now);
                ZeroScoreStatus::Started
            }
            Some(started) => {
                let elapsed = now.duration_since(started);
                if elapsed >= self.limit {
                    ZeroScoreStatus::Expired
                } else {
                    ZeroScoreStatus::Running {
                        remaining: self.limit - elapsed,
                    }
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// True once per `COUNTDOWN_LOG_EVERY` of running time
    pub fn report_due(&mut self, now: Instant) -> bool {
        let Some(started) = self.started else {
            return false;
        };
        let bucket = now.duration_since(started).as_secs() / COUNTDOWN_LOG_EVERY.as_secs();
        if bucket > self.reported {
            self.reported = bucket;
            true
        } else {
            false
        }
    }
}

enum TickOutcome {
    Continue,
    /// At least one extraction failed; back off before the next tick
    Degraded,
    Close(CloseReason),
}

pub struct MatchSession {
    ctx: SessionContext,
    link: SessionLink,
    candidate: EventCandidate,
    state: SessionState,
    zero_score: ZeroScoreTimer,
    last_activity: Instant,
    last_board_refresh: Instant,
}

impl MatchSession {
    pub fn new(ctx: SessionContext, link: SessionLink, candidate: EventCandidate) -> Self {
        let zero_score = ZeroScoreTimer::new(
            &ctx.cfg.no_score_sentinel,
            ctx.cfg.zero_score_timeout(),
        );
        let now = Instant::now();
        Self {
            ctx,
            link,
            candidate,
            state: SessionState::Discovered,
            zero_score,
            last_activity: now,
            last_board_refresh: now,
        }
    }

    pub fn spawn(self) -> JoinHandle<CloseReason> {
        tokio::spawn(self.run())
    }

    /// Drive the session to `CLOSED`; returns why it stopped
    pub async fn run(mut self) -> CloseReason {
        let span = info_span!("session", event_id = %self.link.id());
        async move {
            let reason = match self.start().await {
                Ok(()) => self.poll_loop().await,
                Err(reason) => reason,
            };
            self.close(reason).await;
            reason
        }
        .instrument(span)
        .await
    }

    fn transition(&mut self, to: SessionState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(WatchError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        debug!(from = %self.state, to = %to, "state transition");
        self.state = to;
        Ok(())
    }

    async fn start(&mut self) -> std::result::Result<(), CloseReason> {
        let timeout = self.ctx.cfg.call_timeout();
        match self.link.open_page(timeout).await {
            Ok(true) => {}
            Ok(false) => return Err(CloseReason::Vanished),
            Err(e) => {
                warn!("cannot open event page: {}", e);
                return Err(CloseReason::Fatal);
            }
        }
        info!(url = %self.link.url(), "session started");

        let mut info = self.candidate.initial_snapshot();
        let present = {
            let slot = self.link.page().await;
            let Some(page) = slot.page() else {
                return Err(CloseReason::Vanished);
            };

            match with_timeout("extract_status", timeout, self.ctx.extractor.extract_status(page))
                .await
            {
                Ok(fresh) => {
                    info.merge_from(&fresh);
                }
                Err(e) => debug!("initial status unavailable: {}", e),
            }

            match with_timeout("has_event_area", timeout, self.ctx.extractor.has_event_area(page))
                .await
            {
                Ok(present) => present,
                Err(e) if e.is_fatal_for_session() => {
                    warn!("event page lost: {}", e);
                    return Err(CloseReason::Fatal);
                }
                Err(e) => {
                    self.ctx.metrics.inc_extraction_failures();
                    warn!("event area check failed, treating as absent: {}", e);
                    false
                }
            }
        };

        if !present {
            let grace = self.ctx.cfg.no_event_grace();
            info!(
                grace_secs = grace.as_secs(),
                "no event area, closing after grace delay"
            );
            sleep(grace).await;
            return Err(CloseReason::NoEventArea);
        }

        info!(
            home = %info.home,
            away = %info.away,
            score = %info.score,
            status = %info.status,
            "event area found, monitoring"
        );
        self.ctx.book.open(self.link.id(), info).await;
        if let Err(e) = self.transition(SessionState::Active) {
            warn!("{}", e);
        }
        self.ctx.board.request();
        Ok(())
    }

    async fn poll_loop(&mut self) -> CloseReason {
        loop {
            let pause = match self.tick().await {
                TickOutcome::Continue => self.ctx.cfg.poll_interval(),
                TickOutcome::Degraded => self.ctx.cfg.error_backoff(),
                TickOutcome::Close(reason) => return reason,
            };
            sleep(pause).await;
        }
    }

    async fn tick(&mut self) -> TickOutcome {
        let timeout = self.ctx.cfg.call_timeout();
        let extractor = self.ctx.extractor.clone();
        let id = self.link.id().to_string();
        let mut failures = 0u32;
        let mut appended = 0usize;

        let slot = self.link.page().await;
        let Some(page) = slot.page() else {
            debug!("page released elsewhere");
            return TickOutcome::Close(CloseReason::Vanished);
        };

        match with_timeout("extract_status", timeout, extractor.extract_status(page)).await {
            Ok(fresh) => {
                self.ctx.book.update_info(&id, &fresh).await;
                let now = Instant::now();
                match self.zero_score.observe(&fresh.score, now) {
                    ZeroScoreStatus::Expired => {
                        info!(
                            limit_secs = self.ctx.cfg.zero_score_timeout_secs,
                            "score stuck at sentinel, closing"
                        );
                        return TickOutcome::Close(CloseReason::ScorelessTimeout);
                    }
                    ZeroScoreStatus::Started => info!(
                        limit_secs = self.ctx.cfg.zero_score_timeout_secs,
                        "score at sentinel, zero-score countdown started"
                    ),
                    ZeroScoreStatus::Reset => info!(score = %fresh.score, "zero-score countdown cancelled"),
                    ZeroScoreStatus::Running { remaining } => {
                        if self.zero_score.report_due(now) {
                            info!(remaining_secs = remaining.as_secs(), "still scoreless");
                        }
                    }
                    ZeroScoreStatus::Idle => {}
                }
            }
            Err(e) if e.is_fatal_for_session() => return self.fatal(e),
            Err(e) => {
                failures += 1;
                self.extraction_failed("extract_status", &e);
            }
        }

        match with_timeout("extract_all_events", timeout, extractor.extract_all_events(page)).await
        {
            Ok(batch) => appended += self.ctx.book.merge_all(&id, &batch).await.len(),
            Err(e) if e.is_fatal_for_session() => return self.fatal(e),
            Err(e) => {
                failures += 1;
                self.extraction_failed("extract_all_events", &e);
            }
        }

        match with_timeout(
            "extract_corner_events",
            timeout,
            extractor.extract_corner_events(page),
        )
        .await
        {
            Ok(batch) => {
                let fresh = self.ctx.book.merge_corners(&id, &batch).await;
                if !fresh.is_empty() {
                    info!(count = fresh.len(), "new corner entries");
                    for entry in &fresh {
                        debug!(entry = %entry, "corner");
                    }
                }
                appended += fresh.len();
            }
            Err(e) if e.is_fatal_for_session() => return self.fatal(e),
            Err(e) => {
                failures += 1;
                self.extraction_failed("extract_corner_events", &e);
            }
        }
        drop(slot);

        let now = Instant::now();
        if appended > 0 {
            self.last_activity = now;
            self.last_board_refresh = now;
            self.ctx.flush.request();
            self.ctx.board.request();
        } else if now.duration_since(self.last_board_refresh) >= self.ctx.cfg.display_refresh() {
            self.last_board_refresh = now;
            self.ctx.board.request();
        }

        if failures > 0 {
            TickOutcome::Degraded
        } else {
            TickOutcome::Continue
        }
    }

    fn extraction_failed(&self, call: &str, e: &WatchError) {
        self.ctx.metrics.inc_extraction_failures();
        warn!(call, "extraction failed, backing off: {}", e);
    }

    fn fatal(&self, e: WatchError) -> TickOutcome {
        warn!("event page lost: {}", e);
        TickOutcome::Close(CloseReason::Fatal)
    }

    async fn close(&mut self, reason: CloseReason) {
        if let Err(e) = self.transition(SessionState::Closing) {
            warn!("{}", e);
        }

        let performed = self.link.teardown(reason).await;
        if !performed {
            debug!(%reason, "already torn down elsewhere");
        }

        if let Err(e) = self.transition(SessionState::Closed) {
            warn!("{}", e);
        }
        debug!(
            %reason,
            zero_score_running = self.zero_score.is_running(),
            idle_secs = self.last_activity.elapsed().as_secs(),
            "session finished"
        );
        self.ctx.board.request();
    }
}
