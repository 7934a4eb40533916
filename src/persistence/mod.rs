//! Persistence layer
//!
//! - Snapshot models for the corner file and the all-event archive
//! - Atomic temp-then-rename JSON writes
//! - Interval and on-demand flush service

pub mod flusher;
pub mod snapshot;
pub mod writer;

pub use flusher::{PersistenceService, SnapshotWriter};
pub use snapshot::{
    build_archive, ArchiveEntry, CornerSnapshot, CornerStats, EventArchive, MatchEntry,
    SideMarkers,
};
pub use writer::write_json_atomic;
