//! Serialized forms of the match book.
//!
//! [`CornerSnapshot`] is the file rewritten on every flush; [`EventArchive`]
//! carries every occurrence and is rewritten after discovery cycles and at
//! shutdown. Both are full snapshots, never diffs.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::StatusSnapshot;
use crate::services::book::MatchRecord;

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Substrings attributing a corner description to a side
#[derive(Debug, Clone)]
pub struct SideMarkers {
    pub home: String,
    pub away: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CornerStats {
    pub total: usize,
    pub home: usize,
    pub away: usize,
}

impl CornerStats {
    /// Count corners per side by marker substring.
    ///
    /// A description containing neither marker only counts toward `total`.
    pub fn tally(events: &[String], markers: &SideMarkers) -> Self {
        let side = |marker: &str| {
            if marker.is_empty() {
                return 0;
            }
            events.iter().filter(|e| e.contains(marker)).count()
        };
        Self {
            total: events.len(),
            home: side(&markers.home),
            away: side(&markers.away),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEntry {
    pub match_info: StatusSnapshot,
    pub stats: CornerStats,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CornerSnapshot {
    pub update_time: String,
    pub total_matches: usize,
    pub total_corners: usize,
    pub matches: BTreeMap<String, MatchEntry>,
}

impl CornerSnapshot {
    pub fn build(records: &BTreeMap<String, MatchRecord>, markers: &SideMarkers) -> Self {
        let matches: BTreeMap<String, MatchEntry> = records
            .iter()
            .map(|(id, record)| {
                let events = record.ledger.corners.entries().to_vec();
                let entry = MatchEntry {
                    match_info: record.info.clone(),
                    stats: CornerStats::tally(&events, markers),
                    events,
                };
                (id.clone(), entry)
            })
            .collect();

        Self {
            update_time: Local::now().format(TIME_FORMAT).to_string(),
            total_matches: matches.len(),
            total_corners: matches.values().map(|m| m.stats.total).sum(),
            matches,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub match_info: StatusSnapshot,
    pub events: Vec<String>,
}

/// Every occurrence of every recorded match, keyed by match id
pub type EventArchive = BTreeMap<String, ArchiveEntry>;

pub fn build_archive(records: &BTreeMap<String, MatchRecord>) -> EventArchive {
    records
        .iter()
        .map(|(id, record)| {
            (
                id.clone(),
                ArchiveEntry {
                    match_info: record.info.clone(),
                    events: record.ledger.all.entries().to_vec(),
                },
            )
        })
        .collect()
}
