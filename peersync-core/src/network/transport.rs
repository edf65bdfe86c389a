//! Transport abstraction
//!
//! The core never opens sockets itself. Whatever carries the data channels
//! (WebRTC in a browser shell, the in-memory network in tests) implements
//! [`Transport`] and feeds [`TransportEvent`]s back to the session.

use thiserror::Error;

use crate::sync::PeerId;

/// Transport-related errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Peer unavailable: {0}")]
    PeerUnavailable(String),

    #[error("Not connected to any peer")]
    NotConnected,

    #[error("Transport closed")]
    Closed,

    #[error("Network error: {0}")]
    Network(String),
}

/// Events reported by the transport for one data channel
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A channel to `peer_id` is open and ready
    Open { peer_id: PeerId },
    /// A payload arrived from `from`
    Data { from: PeerId, payload: String },
    /// The channel to `peer_id` closed
    Close { peer_id: PeerId },
    /// Connection-level failure; `fatal` means the transport itself is gone
    Error {
        peer_id: Option<PeerId>,
        message: String,
        fatal: bool,
    },
}

/// Reliable, ordered point-to-point channels to the other peers
pub trait Transport: Send {
    /// Open a channel to `target`; completion is reported as an `Open` event
    fn connect(&mut self, target: &str) -> Result<(), TransportError>;

    /// Send `payload` on every open channel
    fn broadcast(&mut self, payload: &str) -> Result<(), TransportError>;

    /// Close every channel
    fn close_all(&mut self);
}
