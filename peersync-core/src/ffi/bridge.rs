//! Adapters between the uniffi callback interfaces and the session seams

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::network::{Transport, TransportError};
use crate::session::{Notice, PartySnapshot, Player, SessionCallback};
use crate::sync::Role;

use super::types::{PartyCallback, PlaybackDelegate, TransportDelegate};

/// Shared slot for the UI callback, settable after the session started
pub(super) type CallbackSlot = Arc<RwLock<Option<Arc<dyn PartyCallback>>>>;

pub(super) struct DelegatePlayer(pub Arc<dyn PlaybackDelegate>);

impl Player for DelegatePlayer {
    fn current_time(&self) -> f64 {
        self.0.current_time()
    }

    fn set_current_time(&mut self, secs: f64) {
        self.0.set_current_time(secs)
    }

    fn play(&mut self) {
        self.0.play()
    }

    fn pause(&mut self) {
        self.0.pause()
    }

    fn is_paused(&self) -> bool {
        self.0.is_paused()
    }

    fn control_permission_changed(&mut self, may_control: bool) {
        self.0.control_permission_changed(may_control)
    }
}

pub(super) struct DelegateTransport(pub Arc<dyn TransportDelegate>);

impl Transport for DelegateTransport {
    fn connect(&mut self, target: &str) -> Result<(), TransportError> {
        if self.0.connect(target.to_string()) {
            Ok(())
        } else {
            Err(TransportError::PeerUnavailable(target.to_string()))
        }
    }

    fn broadcast(&mut self, payload: &str) -> Result<(), TransportError> {
        if self.0.broadcast(payload.to_string()) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn close_all(&mut self) {
        self.0.close_all()
    }
}

/// Forwards session callbacks to whatever UI callback is registered
pub(super) struct CallbackBridge(pub CallbackSlot);

impl CallbackBridge {
    fn with(&self, f: impl FnOnce(&dyn PartyCallback)) {
        if let Some(cb) = self.0.read().as_ref() {
            f(cb.as_ref());
        }
    }
}

impl SessionCallback for CallbackBridge {
    fn on_role_changed(&self, role: Role) {
        self.with(|cb| cb.on_role_changed(role.into()));
    }

    fn on_roster_changed(&self, snapshot: &PartySnapshot) {
        self.with(|cb| cb.on_party_state_changed(snapshot.clone().into()));
    }

    fn on_notice(&self, notice: Notice) {
        self.with(|cb| cb.on_notice(notice.to_string()));
    }

    fn on_chat(&self, from: &str, sender_name: &str, message: &str) {
        self.with(|cb| cb.on_chat(from.to_string(), sender_name.to_string(), message.to_string()));
    }

    fn on_passthrough(&self, from: &str, kind: &str, payload: &Value) {
        let payload_json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to re-encode {} payload: {}", kind, e);
                return;
            }
        };
        self.with(|cb| cb.on_passthrough(from.to_string(), kind.to_string(), payload_json));
    }

    fn on_party_ended(&self, reason: &str) {
        self.with(|cb| cb.on_party_ended(reason.to_string()));
    }
}
