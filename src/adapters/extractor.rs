//! Page capability consumed by the orchestrator.
//!
//! Everything source-specific (where team names, scores and occurrence
//! descriptions live in a page) sits behind [`PageExtractor`], so a markup
//! change touches one implementation and never the session or discovery
//! logic.

use async_trait::async_trait;

use crate::domain::{EventCandidate, StatusSnapshot};
use crate::error::Result;

/// Opaque handle to one open page.
///
/// Deliberately not `Clone`: the only way to release it is to move it into
/// [`PageExtractor::close_page`], so a handle cannot be released twice.
#[derive(Debug, PartialEq, Eq)]
pub struct PageHandle {
    id: u64,
    url: String,
}

impl PageHandle {
    pub fn new(id: u64, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageExtractor: Send + Sync + 'static {
    /// Implementation name and version, for logs
    fn version(&self) -> &'static str;

    /// Events currently listed as live, already filtered to well-formed rows
    async fn list_candidates(&self) -> Result<Vec<EventCandidate>>;

    /// Acquire a page and navigate it to `url`.
    ///
    /// Fails with `WatchError::Navigation` when the URL cannot be reached.
    async fn open_page(&self, url: &str) -> Result<PageHandle>;

    /// Release a page
    async fn close_page(&self, page: PageHandle) -> Result<()>;

    /// Whether the page shows the live event area at all
    async fn has_event_area(&self, page: &PageHandle) -> Result<bool>;

    /// Current labels, score and status; unknown fields are empty strings
    async fn extract_status(&self, page: &PageHandle) -> Result<StatusSnapshot>;

    /// Raw descriptions of every occurrence visible on the page
    async fn extract_all_events(&self, page: &PageHandle) -> Result<Vec<String>>;

    /// Raw descriptions of the corner occurrences visible on the page
    async fn extract_corner_events(&self, page: &PageHandle) -> Result<Vec<String>>;
}
