pub mod ledger;
pub mod match_info;
pub mod state;

pub use ledger::*;
pub use match_info::*;
pub use state::*;
