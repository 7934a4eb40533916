//! Append-only, deduplicated occurrence ledgers.
//!
//! Entries are stored in their normalized form and never removed or
//! reordered. Two raw strings that normalize to the same text are the same
//! occurrence.

use std::collections::HashSet;

/// Normalize a raw occurrence description into its dedup key.
///
/// Trims the ends and collapses every internal whitespace run to one space,
/// so markup line breaks do not create phantom duplicates.
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Distinct strings in first-seen order
#[derive(Debug, Clone, Default)]
pub struct OccurrenceList {
    entries: Vec<String>,
    seen: HashSet<String>,
}

impl OccurrenceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every candidate whose normalized form is not yet present.
    ///
    /// Returns the newly appended entries in input order; merging the same
    /// batch twice appends nothing the second time.
    pub fn merge<I, S>(&mut self, batch: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut appended = Vec::new();
        for raw in batch {
            let key = normalize(raw.as_ref());
            if key.is_empty() || self.seen.contains(&key) {
                continue;
            }
            self.seen.insert(key.clone());
            self.entries.push(key.clone());
            appended.push(key);
        }
        appended
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.seen.contains(&normalize(raw))
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-event ledger: every occurrence, plus the corner subset
#[derive(Debug, Clone, Default)]
pub struct EventLedger {
    pub all: OccurrenceList,
    pub corners: OccurrenceList,
}

impl EventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_all<I, S>(&mut self, batch: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.all.merge(batch)
    }

    pub fn merge_corners<I, S>(&mut self, batch: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.corners.merge(batch)
    }
}
