//! Shared store of per-match ledgers.
//!
//! A record is created when a session finds the event area and outlives the
//! session, so every flush serializes all matches ever recorded. Each record
//! is written only by the session monitoring that match.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{EventLedger, StatusSnapshot};

#[derive(Debug, Clone, Default)]
pub struct MatchRecord {
    pub info: StatusSnapshot,
    pub ledger: EventLedger,
}

#[derive(Debug, Clone, Default)]
pub struct MatchBook {
    records: Arc<RwLock<BTreeMap<String, MatchRecord>>>,
}

impl MatchBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the record for `id` if absent; an existing record (a match
    /// re-discovered after its session closed) keeps its ledger.
    pub async fn open(&self, id: &str, info: StatusSnapshot) {
        let mut records = self.records.write().await;
        records.entry(id.to_string()).or_insert_with(|| MatchRecord {
            info,
            ledger: EventLedger::new(),
        });
    }

    /// Merge a fresh status extraction; returns the merged snapshot
    pub async fn update_info(&self, id: &str, fresh: &StatusSnapshot) -> Option<StatusSnapshot> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id)?;
        record.info.merge_from(fresh);
        Some(record.info.clone())
    }

    /// Dedup-append into the all-occurrence list; returns new entries
    pub async fn merge_all(&self, id: &str, batch: &[String]) -> Vec<String> {
        let mut records = self.records.write().await;
        match records.get_mut(id) {
            Some(record) => record.ledger.merge_all(batch),
            None => Vec::new(),
        }
    }

    /// Dedup-append into the corner list; returns new entries
    pub async fn merge_corners(&self, id: &str, batch: &[String]) -> Vec<String> {
        let mut records = self.records.write().await;
        match records.get_mut(id) {
            Some(record) => record.ledger.merge_corners(batch),
            None => Vec::new(),
        }
    }

    pub async fn get(&self, id: &str) -> Option<MatchRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.records.read().await.contains_key(id)
    }

    /// Point-in-time copy of every record, ordered by match id
    pub async fn snapshot(&self) -> BTreeMap<String, MatchRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
