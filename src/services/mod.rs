pub mod board;
pub mod book;
pub mod discovery;
pub mod metrics;
pub mod registry;
pub mod session;

pub use board::{BoardRow, BoardSummary, LiveBoard};
pub use book::{MatchBook, MatchRecord};
pub use discovery::{CycleReport, DiscoveryService};
pub use metrics::Metrics;
pub use registry::{PageSlot, SessionLink, SessionRegistry};
pub use session::{MatchSession, SessionContext, ZeroScoreStatus, ZeroScoreTimer};
