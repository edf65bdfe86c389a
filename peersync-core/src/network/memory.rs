//! In-process transport
//!
//! Connects peers living in the same process through unbounded channels.
//! Used by the simulator and the driver tests; delivery is FIFO per sender,
//! like a real ordered data channel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::transport::{Transport, TransportError, TransportEvent};
use crate::sync::PeerId;

#[derive(Default)]
struct Registry {
    /// Event sink of every registered peer
    peers: HashMap<PeerId, mpsc::UnboundedSender<TransportEvent>>,
    /// Open channels, per peer, in the order they were opened
    links: HashMap<PeerId, Vec<PeerId>>,
}

impl Registry {
    fn deliver(&self, to: &str, event: TransportEvent) {
        if let Some(tx) = self.peers.get(to) {
            if tx.send(event).is_err() {
                debug!("Memory network: {} is no longer listening", to);
            }
        }
    }

    fn link(&mut self, a: &str, b: &str) -> bool {
        let a_links = self.links.entry(a.to_string()).or_default();
        if a_links.iter().any(|p| p == b) {
            return false;
        }
        a_links.push(b.to_string());
        self.links.entry(b.to_string()).or_default().push(a.to_string());
        true
    }

    /// Remove every channel of `peer_id`, returning the peers it was linked to
    fn unlink_all(&mut self, peer_id: &str) -> Vec<PeerId> {
        let linked = self.links.remove(peer_id).unwrap_or_default();
        for other in &linked {
            if let Some(other_links) = self.links.get_mut(other) {
                other_links.retain(|p| p != peer_id);
            }
        }
        linked
    }
}

/// A set of peers that can reach each other in-process
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    registry: Arc<Mutex<Registry>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer; returns its transport and the stream of its events
    pub fn register(
        &self,
        peer_id: impl Into<PeerId>,
    ) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let peer_id = peer_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.lock().peers.insert(peer_id.clone(), tx);

        let transport = MemoryTransport {
            local_peer_id: peer_id,
            network: self.clone(),
        };
        (transport, rx)
    }

    /// Simulate a peer vanishing: everyone linked to it sees the channel close
    pub fn drop_peer(&self, peer_id: &str) {
        let mut registry = self.registry.lock();
        registry.peers.remove(peer_id);
        for other in registry.unlink_all(peer_id) {
            registry.deliver(
                &other,
                TransportEvent::Close {
                    peer_id: peer_id.to_string(),
                },
            );
        }
    }

    /// Open a channel between two registered peers; both ends see `Open`.
    /// Linking peers that are already linked is a no-op.
    pub fn link(&self, a: &str, b: &str) -> Result<(), TransportError> {
        let mut registry = self.registry.lock();

        if a == b || !registry.peers.contains_key(a) || !registry.peers.contains_key(b) {
            warn!("Memory network: {} cannot reach {}", a, b);
            return Err(TransportError::PeerUnavailable(b.to_string()));
        }

        if registry.link(a, b) {
            registry.deliver(a, TransportEvent::Open { peer_id: b.to_string() });
            registry.deliver(b, TransportEvent::Open { peer_id: a.to_string() });
        }
        Ok(())
    }

    /// Whether a channel between `a` and `b` is open
    pub fn is_linked(&self, a: &str, b: &str) -> bool {
        self.registry
            .lock()
            .links
            .get(a)
            .map(|links| links.iter().any(|p| p == b))
            .unwrap_or(false)
    }
}

/// One peer's endpoint on a [`MemoryNetwork`]
pub struct MemoryTransport {
    local_peer_id: PeerId,
    network: MemoryNetwork,
}

impl Transport for MemoryTransport {
    fn connect(&mut self, target: &str) -> Result<(), TransportError> {
        self.network.link(&self.local_peer_id, target)
    }

    fn broadcast(&mut self, payload: &str) -> Result<(), TransportError> {
        let registry = self.network.registry.lock();
        let links = match registry.links.get(&self.local_peer_id) {
            Some(links) if !links.is_empty() => links,
            _ => return Err(TransportError::NotConnected),
        };

        for peer_id in links {
            registry.deliver(
                peer_id,
                TransportEvent::Data {
                    from: self.local_peer_id.clone(),
                    payload: payload.to_string(),
                },
            );
        }
        Ok(())
    }

    fn close_all(&mut self) {
        let mut registry = self.network.registry.lock();
        for other in registry.unlink_all(&self.local_peer_id) {
            registry.deliver(
                &other,
                TransportEvent::Close {
                    peer_id: self.local_peer_id.clone(),
                },
            );
        }
    }
}
