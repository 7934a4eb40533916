//! Coordination between the long-running tasks
//!
//! - Coalescing wake-ups from sessions to the flusher and the board
//! - Graceful shutdown handling

pub mod shutdown;
pub mod wakeup;

pub use shutdown::{install_signal_handlers, GracefulShutdown, ShutdownPhase, ShutdownSignal};
pub use wakeup::Wakeup;
