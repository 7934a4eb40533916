#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cornerwatch::adapters::{PageExtractor, PageHandle};
use cornerwatch::config::SessionConfig;
use cornerwatch::coordination::Wakeup;
use cornerwatch::domain::{EventCandidate, StatusSnapshot};
use cornerwatch::error::{Result, WatchError};
use cornerwatch::services::{MatchBook, Metrics, SessionContext, SessionRegistry};

/// What one event page returns, poll after poll.
///
/// Each queue yields its front element per call; the last element repeats.
#[derive(Debug, Clone)]
pub struct PageScript {
    pub event_area: bool,
    pub statuses: VecDeque<StatusSnapshot>,
    pub all_events: VecDeque<Vec<String>>,
    pub corners: VecDeque<Vec<String>>,
}

impl Default for PageScript {
    fn default() -> Self {
        Self {
            event_area: true,
            statuses: VecDeque::from([StatusSnapshot::new("", "", "1:0", "in progress")]),
            all_events: VecDeque::from([Vec::new()]),
            corners: VecDeque::from([Vec::new()]),
        }
    }
}

impl PageScript {
    pub fn without_event_area() -> Self {
        Self {
            event_area: false,
            ..Self::default()
        }
    }

    pub fn scores(mut self, scores: &[&str]) -> Self {
        self.statuses = scores
            .iter()
            .map(|s| StatusSnapshot::new("", "", *s, "in progress"))
            .collect();
        self
    }

    pub fn corners(mut self, polls: &[&[&str]]) -> Self {
        self.corners = polls
            .iter()
            .map(|poll| poll.iter().map(|s| s.to_string()).collect())
            .collect();
        self
    }
}

#[derive(Default)]
struct State {
    listing: Vec<EventCandidate>,
    listing_fails: bool,
    scripts: HashMap<String, PageScript>,
    open: HashMap<u64, String>,
    next_id: u64,
    opened: usize,
    closed: usize,
    status_calls: HashMap<String, usize>,
}

fn next<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

/// In-memory extractor driven by per-page scripts
#[derive(Default)]
pub struct ScriptedExtractor {
    state: Mutex<State>,
}

impl ScriptedExtractor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_listing(&self, ids: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.listing = ids.iter().map(|id| candidate(id)).collect();
        state.listing_fails = false;
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().listing_fails = true;
    }

    pub fn script(&self, id: &str, script: PageScript) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(url_for(id), script);
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    pub fn status_polls(&self, id: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.status_calls.get(&url_for(id)).copied().unwrap_or(0)
    }

    pub fn open_now(&self) -> usize {
        self.state.lock().unwrap().open.len()
    }

    fn check_open(&self, page: &PageHandle) -> Result<String> {
        let state = self.state.lock().unwrap();
        state
            .open
            .get(&page.id())
            .cloned()
            .ok_or_else(|| WatchError::Navigation {
                url: page.url().to_string(),
                reason: "page already closed".to_string(),
            })
    }

    fn with_script<T>(&self, url: &str, f: impl FnOnce(&mut PageScript) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        let script = state.scripts.entry(url.to_string()).or_default();
        f(script)
    }
}

#[async_trait]
impl PageExtractor for ScriptedExtractor {
    fn version(&self) -> &'static str {
        "scripted/1"
    }

    async fn list_candidates(&self) -> Result<Vec<EventCandidate>> {
        let state = self.state.lock().unwrap();
        if state.listing_fails {
            return Err(WatchError::TransientExtraction("listing unavailable".into()));
        }
        Ok(state.listing.clone())
    }

    async fn open_page(&self, url: &str) -> Result<PageHandle> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.opened += 1;
        let id = state.next_id;
        state.open.insert(id, url.to_string());
        Ok(PageHandle::new(id, url))
    }

    async fn close_page(&self, page: PageHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.open.remove(&page.id()).is_none() {
            panic!("page {} released twice", page.id());
        }
        state.closed += 1;
        Ok(())
    }

    async fn has_event_area(&self, page: &PageHandle) -> Result<bool> {
        let url = self.check_open(page)?;
        Ok(self.with_script(&url, |s| s.event_area))
    }

    async fn extract_status(&self, page: &PageHandle) -> Result<StatusSnapshot> {
        let url = self.check_open(page)?;
        *self
            .state
            .lock()
            .unwrap()
            .status_calls
            .entry(url.clone())
            .or_default() += 1;
        Ok(self
            .with_script(&url, |s| next(&mut s.statuses))
            .unwrap_or_default())
    }

    async fn extract_all_events(&self, page: &PageHandle) -> Result<Vec<String>> {
        let url = self.check_open(page)?;
        Ok(self
            .with_script(&url, |s| next(&mut s.all_events))
            .unwrap_or_default())
    }

    async fn extract_corner_events(&self, page: &PageHandle) -> Result<Vec<String>> {
        let url = self.check_open(page)?;
        Ok(self
            .with_script(&url, |s| next(&mut s.corners))
            .unwrap_or_default())
    }
}

pub fn url_for(id: &str) -> String {
    format!("https://scripted.test/live/{id}/")
}

pub fn candidate(id: &str) -> EventCandidate {
    EventCandidate {
        id: id.to_string(),
        url: url_for(id),
        home: format!("{id}-home"),
        away: format!("{id}-away"),
        score: String::new(),
        status: "in progress".to_string(),
    }
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        poll_interval_secs: 3,
        no_event_grace_secs: 20,
        zero_score_timeout_secs: 10,
        display_refresh_secs: 10,
        error_backoff_secs: 3,
        call_timeout_secs: 5,
        no_score_sentinel: "0:0".to_string(),
    }
}

pub fn context(extractor: Arc<ScriptedExtractor>, cfg: SessionConfig) -> SessionContext {
    let extractor: Arc<dyn PageExtractor> = extractor;
    let metrics = Arc::new(Metrics::new());
    SessionContext {
        registry: SessionRegistry::new(extractor.clone(), metrics.clone(), Duration::from_secs(5)),
        extractor,
        book: MatchBook::new(),
        flush: Wakeup::new(),
        board: Wakeup::new(),
        metrics,
        cfg,
    }
}

pub fn temp_path(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("cornerwatch-it-{tag}-{}", uuid::Uuid::new_v4()))
}
