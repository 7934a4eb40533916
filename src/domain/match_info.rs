use serde::{Deserialize, Serialize};

pub const UNKNOWN_HOME: &str = "未知主队";
pub const UNKNOWN_AWAY: &str = "未知客队";
pub const DEFAULT_SCORE: &str = "0:0";
pub const DEFAULT_STATUS: &str = "进行中";

/// Team labels, score and status of one match.
///
/// Serializes as the `match_info` object of the persisted snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub home: String,
    pub away: String,
    pub score: String,
    pub status: String,
}

impl StatusSnapshot {
    pub fn new(
        home: impl Into<String>,
        away: impl Into<String>,
        score: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            home: home.into(),
            away: away.into(),
            score: score.into(),
            status: status.into(),
        }
    }

    /// Overwrite each field for which `fresh` carries a non-empty value.
    ///
    /// A populated field never regresses to empty. Returns whether anything
    /// changed.
    pub fn merge_from(&mut self, fresh: &StatusSnapshot) -> bool {
        let mut changed = false;
        for (current, incoming) in [
            (&mut self.home, &fresh.home),
            (&mut self.away, &fresh.away),
            (&mut self.score, &fresh.score),
            (&mut self.status, &fresh.status),
        ] {
            let incoming = incoming.trim();
            if !incoming.is_empty() && current.as_str() != incoming {
                *current = incoming.to_string();
                changed = true;
            }
        }
        changed
    }
}

/// Canonical score form: no whitespace, full-width colon folded to ASCII.
pub fn normalize_score(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '：' { ':' } else { c })
        .collect()
}

/// A live, already-started event reported by the listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCandidate {
    pub id: String,
    pub url: String,
    pub home: String,
    pub away: String,
    pub score: String,
    pub status: String,
}

impl EventCandidate {
    /// False when the status carries any "not yet started" marker
    pub fn has_started(&self, not_started_markers: &[String]) -> bool {
        !not_started_markers
            .iter()
            .filter(|m| !m.is_empty())
            .any(|m| self.status.contains(m.as_str()))
    }

    /// Starting snapshot for a new session, with placeholders for blanks
    pub fn initial_snapshot(&self) -> StatusSnapshot {
        fn or_default(value: &str, fallback: &str) -> String {
            let value = value.trim();
            if value.is_empty() {
                fallback.to_string()
            } else {
                value.to_string()
            }
        }

        StatusSnapshot {
            home: or_default(&self.home, UNKNOWN_HOME),
            away: or_default(&self.away, UNKNOWN_AWAY),
            score: or_default(&self.score, DEFAULT_SCORE),
            status: or_default(&self.status, DEFAULT_STATUS),
        }
    }
}
