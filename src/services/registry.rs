//! Registry of currently monitored events.
//!
//! The registry is the single source of truth for "being monitored" and the
//! one coordination point between a session and discovery. Teardown goes
//! through [`SessionRegistry::teardown`] or [`SessionLink::teardown`]; both
//! end in the same critical section, which flips the session's page slot to
//! `Released` under its mutex. Whoever flips it releases the page and then
//! removes the entry; any later caller finds `Released` and does nothing.

use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::{PageExtractor, PageHandle};
use crate::domain::{CloseReason, EventCandidate};
use crate::error::{with_timeout, Result, WatchError};
use crate::services::metrics::Metrics;

/// Ownership state of a session's page
#[derive(Debug)]
pub enum PageSlot {
    /// Registered, page not acquired yet
    Pending,
    Open(PageHandle),
    /// Torn down; terminal
    Released,
}

impl PageSlot {
    pub fn page(&self) -> Option<&PageHandle> {
        match self {
            PageSlot::Open(page) => Some(page),
            _ => None,
        }
    }

    pub fn is_released(&self) -> bool {
        matches!(self, PageSlot::Released)
    }
}

#[derive(Debug, Clone)]
struct SessionEntry {
    uid: Uuid,
    page: Arc<Mutex<PageSlot>>,
}

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    extractor: Arc<dyn PageExtractor>,
    metrics: Arc<Metrics>,
    call_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(
        extractor: Arc<dyn PageExtractor>,
        metrics: Arc<Metrics>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            extractor,
            metrics,
            call_timeout,
        }
    }

    /// Claim the slot for `candidate.id`; `None` if it is already monitored
    pub async fn register(&self, candidate: &EventCandidate) -> Option<SessionLink> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&candidate.id) {
            return None;
        }

        let entry = SessionEntry {
            uid: Uuid::new_v4(),
            page: Arc::new(Mutex::new(PageSlot::Pending)),
        };
        let link = SessionLink {
            id: candidate.id.clone(),
            url: candidate.url.clone(),
            uid: entry.uid,
            page: entry.page.clone(),
            registry: self.clone(),
        };
        sessions.insert(candidate.id.clone(), entry);
        self.metrics.inc_sessions_started();
        debug!(event_id = %candidate.id, "session registered");
        Some(link)
    }

    pub async fn ids(&self) -> BTreeSet<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Tear down whatever session currently occupies `id`.
    ///
    /// Returns true if this call performed the teardown.
    pub async fn teardown(&self, id: &str, reason: CloseReason) -> bool {
        let uid = match self.sessions.read().await.get(id) {
            Some(entry) => entry.uid,
            None => return false,
        };
        self.teardown_session(id, uid, reason).await
    }

    /// Tear down every registered session; returns how many this call closed
    pub async fn teardown_all(&self, reason: CloseReason) -> usize {
        let targets: Vec<(String, Uuid)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, e)| (id.clone(), e.uid))
            .collect();

        join_all(
            targets
                .iter()
                .map(|(id, uid)| self.teardown_session(id, *uid, reason)),
        )
        .await
        .into_iter()
        .filter(|closed| *closed)
        .count()
    }

    async fn teardown_session(&self, id: &str, uid: Uuid, reason: CloseReason) -> bool {
        let entry = match self.sessions.read().await.get(id) {
            Some(entry) if entry.uid == uid => entry.clone(),
            _ => return false,
        };

        // Waits for an in-flight tick to finish with the page.
        let previous = {
            let mut slot = entry.page.lock().await;
            std::mem::replace(&mut *slot, PageSlot::Released)
        };

        match previous {
            PageSlot::Released => return false,
            PageSlot::Open(page) => {
                let url = page.url().to_string();
                if let Err(e) =
                    with_timeout("close_page", self.call_timeout, self.extractor.close_page(page))
                        .await
                {
                    warn!(event_id = %id, "page release failed for {}: {}", url, e);
                }
            }
            PageSlot::Pending => {}
        }

        {
            let mut sessions = self.sessions.write().await;
            if sessions.get(id).map(|e| e.uid == uid).unwrap_or(false) {
                sessions.remove(id);
            }
        }

        self.metrics.inc_closed(reason);
        info!(event_id = %id, %reason, "session closed");
        true
    }
}

/// A session's view of its own registry slot
pub struct SessionLink {
    id: String,
    url: String,
    uid: Uuid,
    page: Arc<Mutex<PageSlot>>,
    registry: SessionRegistry,
}

impl SessionLink {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn uid(&self) -> Uuid {
        self.uid
    }

    /// Acquire the page and navigate it to the event URL.
    ///
    /// Returns `Ok(false)` without navigating when the session was already
    /// torn down. Any failure, including a timeout, is a navigation error.
    pub async fn open_page(&self, timeout: Duration) -> Result<bool> {
        let mut slot = self.page.lock().await;
        if !matches!(*slot, PageSlot::Pending) {
            return Ok(false);
        }

        let extractor = self.registry.extractor.clone();
        let page = with_timeout("open_page", timeout, extractor.open_page(&self.url))
            .await
            .map_err(|e| match e {
                nav @ WatchError::Navigation { .. } => nav,
                other => WatchError::Navigation {
                    url: self.url.clone(),
                    reason: other.to_string(),
                },
            })?;

        *slot = PageSlot::Open(page);
        Ok(true)
    }

    /// Exclusive access to the page for the duration of the guard
    pub async fn page(&self) -> MutexGuard<'_, PageSlot> {
        self.page.lock().await
    }

    pub async fn is_released(&self) -> bool {
        self.page.lock().await.is_released()
    }

    pub async fn teardown(&self, reason: CloseReason) -> bool {
        self.registry
            .teardown_session(&self.id, self.uid, reason)
            .await
    }
}
