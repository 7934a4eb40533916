use serde::{Deserialize, Serialize};
use std::fmt;

/// Match session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Registered by discovery, page not yet checked
    Discovered,
    /// Event area found, polling the page
    Active,
    /// Releasing the page and leaving the registry
    Closing,
    /// Terminal
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Discovered => "DISCOVERED",
            SessionState::Active => "ACTIVE",
            SessionState::Closing => "CLOSING",
            SessionState::Closed => "CLOSED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;

        match (self, target) {
            // From Discovered
            (Discovered, Active) => true,  // Event area present
            (Discovered, Closing) => true, // No event area, navigation failure, or swept

            // From Active
            (Active, Closing) => true,

            // From Closing
            (Closing, Closed) => true,

            // All other transitions are invalid
            _ => false,
        }
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<SessionState> {
        use SessionState::*;

        match self {
            Discovered => vec![Active, Closing],
            Active => vec![Closing],
            Closing => vec![Closed],
            Closed => vec![],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SessionState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "DISCOVERED" => Ok(SessionState::Discovered),
            "ACTIVE" => Ok(SessionState::Active),
            "CLOSING" => Ok(SessionState::Closing),
            "CLOSED" => Ok(SessionState::Closed),
            _ => Err(format!("Unknown state: {}", s)),
        }
    }
}

/// Why a session left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    /// Page never showed an event area
    NoEventArea,
    /// Score stayed at the no-score sentinel for too long
    ScorelessTimeout,
    /// Event no longer listed as live
    Vanished,
    /// Page became unusable
    Fatal,
    /// Process drain
    Shutdown,
}

impl CloseReason {
    pub const ALL: [CloseReason; 5] = [
        CloseReason::NoEventArea,
        CloseReason::ScorelessTimeout,
        CloseReason::Vanished,
        CloseReason::Fatal,
        CloseReason::Shutdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::NoEventArea => "no_event_area",
            CloseReason::ScorelessTimeout => "scoreless_timeout",
            CloseReason::Vanished => "vanished",
            CloseReason::Fatal => "fatal",
            CloseReason::Shutdown => "shutdown",
        }
    }

    /// Closures the session decides on by itself, as opposed to being swept
    pub fn is_self_initiated(&self) -> bool {
        matches!(
            self,
            CloseReason::NoEventArea | CloseReason::ScorelessTimeout | CloseReason::Fatal
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State transition event (for logging/debugging)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StateTransition {
    pub fn new(from: SessionState, to: SessionState, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}
