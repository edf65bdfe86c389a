//! Sync Engine
//!
//! Wire protocol, party state and the pure rules the dispatcher applies.

pub mod drift;
pub mod election;
pub mod guard;
mod protocol;
mod state;

pub use drift::{Reconciliation, SyncThresholds};
pub use election::elect_successor;
pub use guard::ReentrancyGuard;
pub use protocol::*;
pub use state::*;
