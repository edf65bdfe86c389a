//! PeerSync - Core Library
//!
//! This library keeps media playback in lockstep across the peers of a
//! watch party. One peer hosts and routes every control action; the others
//! request, obey and report drift.

pub mod config;
pub mod ffi;
pub mod latency;
pub mod network;
pub mod runtime;
pub mod session;
pub mod sync;

// Re-exports for convenience
pub use config::SessionConfig;
pub use network::{MemoryNetwork, PartyCode, Transport, TransportError, TransportEvent};
pub use runtime::{DriverError, DriverHandle, SessionDriver};
pub use session::{
    DeferredTask, DispatchError, Notice, PartySnapshot, PlaybackEvent, Player, Scheduler,
    Session, SessionCallback, SessionError,
};
pub use sync::{Message, PeerId, Role};

// Setup uniffi scaffolding
uniffi::setup_scaffolding!();
