pub mod adapters;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod monitor;
pub mod persistence;
pub mod services;

pub use adapters::{HtmlPageExtractor, PageExtractor, PageHandle};
pub use config::AppConfig;
pub use coordination::{GracefulShutdown, ShutdownSignal};
pub use domain::{CloseReason, EventCandidate, EventLedger, SessionState, StatusSnapshot};
pub use error::{Result, WatchError};
pub use monitor::CornerMonitor;
pub use persistence::{CornerSnapshot, SnapshotWriter};
pub use services::{DiscoveryService, MatchBook, MatchSession, Metrics, SessionRegistry};
