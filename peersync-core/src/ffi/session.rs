//! Session implementation for FFI

use std::sync::{Arc, Once};

use parking_lot::RwLock;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::network::TransportEvent;
use crate::runtime::{DriverHandle, SessionDriver};
use crate::session::PlaybackEvent;

use super::bridge::{CallbackBridge, CallbackSlot, DelegatePlayer, DelegateTransport};
use super::types::*;

static TRACING_INIT: Once = Once::new();

/// Main party interface for native shells
#[derive(uniffi::Object)]
pub struct PartySession {
    runtime: Runtime,
    driver: DriverHandle,
    callback: CallbackSlot,
}

#[uniffi::export]
impl PartySession {
    /// Create a new session around the shell's player and data channels
    #[uniffi::constructor]
    pub fn new(
        nickname: Option<String>,
        player: Box<dyn PlaybackDelegate>,
        transport: Box<dyn TransportDelegate>,
    ) -> Self {
        // Initialize tracing once
        TRACING_INIT.call_once(|| {
            let mut filter = tracing_subscriber::EnvFilter::from_default_env();
            if let Ok(directive) = "peersync_core=debug".parse() {
                filter = filter.add_directive(directive);
            }
            tracing_subscriber::fmt()
                .with_ansi(false) // Disable colors for IDE consoles
                .with_target(false)
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        });

        info!("Initializing peersync-core session");

        let runtime = Runtime::new().expect("Failed to create tokio runtime");

        let mut config = SessionConfig::default();
        if let Some(nickname) = nickname.filter(|n| !n.trim().is_empty()) {
            config = config.with_nickname(nickname);
        }

        let callback: CallbackSlot = Arc::new(RwLock::new(None));
        let driver = SessionDriver::spawn(
            runtime.handle(),
            config,
            Box::new(DelegateTransport(Arc::from(transport))),
            Box::new(DelegatePlayer(Arc::from(player))),
            Some(Arc::new(CallbackBridge(Arc::clone(&callback)))),
        );

        Self {
            runtime,
            driver,
            callback,
        }
    }

    /// Set the event callback
    pub fn set_callback(&self, callback: Box<dyn PartyCallback>) {
        *self.callback.write() = Some(Arc::from(callback));
    }

    /// Host a new party. Returns the party code to share.
    pub fn create_party(&self, local_peer_id: String) -> Result<String, CoreError> {
        let code = self
            .runtime
            .block_on(self.driver.create_party(&local_peer_id))?;
        info!("Party ready: {}", code);
        Ok(code.as_str().to_string())
    }

    /// Join the party identified by `party_code`
    pub fn join_party(&self, local_peer_id: String, party_code: String) -> Result<(), CoreError> {
        self.runtime
            .block_on(self.driver.join_party(&local_peer_id, &party_code))
            .map_err(|e| {
                warn!("join_party failed: {}", e);
                e.into()
            })
    }

    pub fn leave_party(&self) -> Result<(), CoreError> {
        Ok(self.runtime.block_on(self.driver.leave_party())?)
    }

    /// Host only: grant or revoke a member's control
    pub fn set_member_control(&self, peer_id: String, can_control: bool) -> Result<(), CoreError> {
        Ok(self
            .runtime
            .block_on(self.driver.set_member_control(&peer_id, can_control))?)
    }

    /// Host only: flip a member's control. Returns the new value.
    pub fn toggle_member_control(&self, peer_id: String) -> Result<bool, CoreError> {
        Ok(self
            .runtime
            .block_on(self.driver.toggle_member_control(&peer_id))?)
    }

    pub fn set_nickname(&self, nickname: String) -> Result<(), CoreError> {
        Ok(self.driver.set_nickname(&nickname)?)
    }

    pub fn send_chat(&self, message: String) -> Result<(), CoreError> {
        Ok(self.runtime.block_on(self.driver.send_chat(&message))?)
    }

    /// Probe the connection; the result arrives as a notice
    pub fn test_connection(&self) -> Result<(), CoreError> {
        Ok(self.runtime.block_on(self.driver.test_connection())?)
    }

    pub fn get_party_state(&self) -> Result<PartyState, CoreError> {
        let snapshot = self.runtime.block_on(self.driver.snapshot())?;
        Ok(snapshot.into())
    }

    /// Whether a user-initiated play/pause/seek should be let through
    pub fn may_control(&self) -> bool {
        self.runtime
            .block_on(self.driver.snapshot())
            .map(|s| s.can_control)
            .unwrap_or(true)
    }

    // === Player events ===

    pub fn local_play(&self) {
        self.local_event(PlaybackEvent::Play);
    }

    pub fn local_pause(&self) {
        self.local_event(PlaybackEvent::Pause);
    }

    pub fn local_seeked(&self) {
        self.local_event(PlaybackEvent::Seeked);
    }

    // === Transport events ===

    pub fn connection_opened(&self, peer_id: String) {
        self.transport_event(TransportEvent::Open { peer_id });
    }

    pub fn data_received(&self, from: String, payload: String) {
        self.transport_event(TransportEvent::Data { from, payload });
    }

    pub fn connection_closed(&self, peer_id: String) {
        self.transport_event(TransportEvent::Close { peer_id });
    }

    /// `fatal` means the transport as a whole is gone (network change, ...)
    pub fn transport_error(&self, peer_id: Option<String>, message: String, fatal: bool) {
        self.transport_event(TransportEvent::Error {
            peer_id,
            message,
            fatal,
        });
    }
}

impl PartySession {
    fn local_event(&self, event: PlaybackEvent) {
        if let Err(e) = self.driver.local_event(event) {
            debug!("Dropping {:?}: {}", event, e);
        }
    }

    fn transport_event(&self, event: TransportEvent) {
        if let Err(e) = self.driver.transport_event(event) {
            debug!("Dropping transport event: {}", e);
        }
    }
}

impl Drop for PartySession {
    fn drop(&mut self) {
        self.driver.shutdown();
    }
}
