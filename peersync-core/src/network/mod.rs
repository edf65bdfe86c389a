//! Peer-to-peer transport plumbing
//!
//! The transport is owned by the shell; this module defines the seam plus an
//! in-process implementation.

mod memory;
mod party_code;
mod transport;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use party_code::PartyCode;
pub use transport::{Transport, TransportError, TransportEvent};
