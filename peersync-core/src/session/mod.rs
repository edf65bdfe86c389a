//! Session
//!
//! The protocol dispatcher. A `Session` owns the party state and reacts to
//! three kinds of input: transport events, local player events and timer
//! firings. Each input runs to completion before the next one is handled.

mod collaborators;
mod handlers;
mod membership;
mod permissions;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

pub use collaborators::{
    DeferredTask, Notice, PlaybackEvent, Player, Scheduler, SessionCallback,
};

use crate::config::SessionConfig;
use crate::latency::LatencyTracker;
use crate::network::{PartyCode, Transport, TransportError, TransportEvent};
use crate::sync::{
    ControlAction, ControlCommand, ControlRequest, Message, Party, PeerId, ProtocolError,
    ReentrancyGuard, Role,
};

/// Errors returned by user-facing session operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Already in a party")]
    AlreadyInParty,

    #[error("Not in a party")]
    NotInParty,

    #[error("Not the host")]
    NotHost,

    #[error("Invalid party code: {0}")]
    InvalidPartyCode(String),

    #[error("Unknown member: {0}")]
    UnknownMember(PeerId),

    #[error("The host always keeps control")]
    HostPermissionFixed,

    #[error("Chat message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Why an inbound message was dropped.
///
/// Never surfaced to the user; the session logs it and moves on.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("{kind} from {from} is not backed by host authority")]
    AuthorityViolation { kind: String, from: PeerId },

    #[error("{0}")]
    StateInconsistency(String),
}

/// One roster entry as shown to the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberView {
    pub peer_id: PeerId,
    pub nickname: String,
    pub can_control: bool,
    pub is_host: bool,
}

/// Read-only view of the party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartySnapshot {
    pub role: Role,
    pub local_peer_id: Option<PeerId>,
    pub host_peer_id: Option<PeerId>,
    pub members: Vec<MemberView>,
    pub can_control: bool,
}

/// The per-peer sync engine
pub struct Session {
    config: SessionConfig,
    party: Party,
    guard: ReentrancyGuard,
    latency: LatencyTracker,
    /// Peers with an open data channel, in connection order
    connections: Vec<PeerId>,
    /// Reconnection attempts made since the last successful join
    reconnect_attempts: u32,
    last_denied_notice: Option<Instant>,
    transport: Box<dyn Transport>,
    player: Box<dyn Player>,
    scheduler: Box<dyn Scheduler>,
    callback: Option<Arc<dyn SessionCallback>>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        transport: Box<dyn Transport>,
        player: Box<dyn Player>,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        let guard = ReentrancyGuard::new(config.reentrancy_window);
        Self {
            config,
            party: Party::default(),
            guard,
            latency: LatencyTracker::new(),
            connections: Vec::new(),
            reconnect_attempts: 0,
            last_denied_notice: None,
            transport,
            player,
            scheduler,
            callback: None,
        }
    }

    /// Register the UI callback
    pub fn set_callback(&mut self, callback: Arc<dyn SessionCallback>) {
        self.callback = Some(callback);
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn party(&self) -> &Party {
        &self.party
    }

    pub fn role(&self) -> Role {
        self.party.role
    }

    /// Whether a local play/pause/seek is allowed right now.
    ///
    /// Player shells consult this before letting a user action through.
    pub fn may_control(&self) -> bool {
        self.party.may_control()
    }

    /// Peers we currently have an open channel with
    pub fn connections(&self) -> &[PeerId] {
        &self.connections
    }

    pub fn snapshot(&self) -> PartySnapshot {
        let members = self
            .party
            .roster
            .iter()
            .map(|(peer_id, member)| MemberView {
                peer_id: peer_id.clone(),
                nickname: member.nickname.clone(),
                can_control: member.can_control || self.party.is_host_peer(peer_id),
                is_host: self.party.is_host_peer(peer_id),
            })
            .collect();

        PartySnapshot {
            role: self.party.role,
            local_peer_id: self.party.local_peer_id.clone(),
            host_peer_id: self.party.host_peer_id.clone(),
            members,
            can_control: self.party.may_control(),
        }
    }

    // ========================================================================
    // Party lifecycle
    // ========================================================================

    /// Start a party with ourselves as host
    pub fn create_party(&mut self, local_peer_id: impl Into<PeerId>) -> Result<PartyCode, SessionError> {
        if self.party.role.in_party() {
            return Err(SessionError::AlreadyInParty);
        }

        let local_peer_id = local_peer_id.into();
        let code = PartyCode::from_peer_id(&local_peer_id);
        self.party = Party::new_as_host(local_peer_id, self.config.nickname.clone());
        info!("Created party {}", code);

        self.notify_role();
        self.notify_roster();
        Ok(code)
    }

    /// Join the party hosted by the peer behind `party_code`
    pub fn join_party(&mut self, local_peer_id: impl Into<PeerId>, party_code: &str) -> Result<(), SessionError> {
        if self.party.role.in_party() {
            return Err(SessionError::AlreadyInParty);
        }

        let code = PartyCode::parse(party_code)
            .ok_or_else(|| SessionError::InvalidPartyCode(party_code.to_string()))?;
        let local_peer_id = local_peer_id.into();
        if code.as_str() == local_peer_id {
            return Err(SessionError::InvalidPartyCode(party_code.to_string()));
        }

        info!("Joining party {}", code);
        let could_control = self.party.may_control();
        self.party = Party::new_joining(local_peer_id, code.as_str().to_string());
        self.refresh_control(could_control);
        self.notify_role();

        if let Err(e) = self.transport.connect(code.as_str()) {
            warn!("Failed to reach host {}: {}", code, e);
            self.reset();
            self.notify_role();
            return Err(e.into());
        }
        Ok(())
    }

    /// Close every channel and forget the party
    pub fn leave_party(&mut self) -> Result<(), SessionError> {
        if !self.party.role.in_party() {
            return Err(SessionError::NotInParty);
        }

        info!("Leaving party");
        self.transport.close_all();
        self.reset();
        self.notify_role();
        Ok(())
    }

    /// Change our display name and tell the others
    pub fn set_nickname(&mut self, nickname: impl Into<String>) {
        let nickname = nickname.into();
        self.config.nickname = nickname.clone();

        let local_id = self.party.local_id().to_string();
        if let Some(me) = self.party.roster.get_mut(&local_id) {
            me.nickname = nickname.clone();
        }

        match self.party.role {
            Role::Hosting => {
                self.broadcast_roster();
                self.notify_roster();
            }
            Role::Joined => self.broadcast(&Message::UserInfo { nickname }),
            _ => {}
        }
    }

    /// Send a chat line to everyone we're connected to
    pub fn send_chat(&mut self, message: &str) -> Result<(), SessionError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if !self.party.role.in_party() {
            return Err(SessionError::NotInParty);
        }

        self.try_broadcast(&Message::Chat {
            message: message.to_string(),
            sender_name: self.config.nickname.clone(),
        })
    }

    /// Send a connection test probe; answers come back as `LinkMeasured` notices
    pub fn test_connection(&mut self) -> Result<(), SessionError> {
        if !self.party.role.in_party() {
            return Err(SessionError::NotInParty);
        }

        let timestamp = self.latency.create_probe();
        let from = if self.party.is_host() { "host" } else { "joiner" };
        self.try_broadcast(&Message::ConnectionTest {
            message: format!("Testing connection from {}", from),
            timestamp,
        })
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Feed one transport event
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open { peer_id } => self.handle_connection_open(peer_id),
            TransportEvent::Data { from, payload } => {
                let result = Message::decode(&payload)
                    .map_err(DispatchError::from)
                    .and_then(|msg| self.handle_message(&from, msg));
                if let Err(e) = result {
                    log_dropped(&from, &e);
                }
            }
            TransportEvent::Close { peer_id } => self.handle_connection_closed(peer_id),
            TransportEvent::Error {
                peer_id,
                message,
                fatal,
            } => self.handle_transport_error(peer_id, message, fatal),
        }
    }

    /// A play/pause/seek the local player performed
    pub fn handle_local_event(&mut self, event: PlaybackEvent) {
        if self.guard.is_active() {
            debug!("Ignoring {:?}: caused by a remote command", event);
            return;
        }

        match self.party.role {
            Role::Unattached => {}
            Role::Hosting => {
                let command = match event {
                    PlaybackEvent::Play => ControlCommand::new(ControlAction::Play),
                    PlaybackEvent::Pause => ControlCommand::new(ControlAction::Pause),
                    PlaybackEvent::Seeked => {
                        ControlCommand::seek(self.player.current_time(), !self.player.is_paused())
                    }
                };
                debug!("Host broadcasting {:?}", command.action);
                self.broadcast(&Message::ControlCommand(command));
            }
            Role::Joined if self.party.can_control => {
                let request = match event {
                    PlaybackEvent::Play => ControlRequest {
                        action: ControlAction::Play,
                        time: None,
                        is_playing: None,
                    },
                    PlaybackEvent::Pause => ControlRequest {
                        action: ControlAction::Pause,
                        time: None,
                        is_playing: None,
                    },
                    PlaybackEvent::Seeked => ControlRequest {
                        action: ControlAction::Seek,
                        time: Some(self.player.current_time()),
                        is_playing: Some(!self.player.is_paused()),
                    },
                };
                debug!("Requesting {:?} from host", request.action);
                self.broadcast(&Message::ControlRequest(request));
            }
            Role::Joined | Role::Joining | Role::Disconnected => self.notice_denied(),
        }
    }

    /// Periodic drift report to the host
    pub fn on_sync_check_tick(&mut self) {
        if self.party.role != Role::Joined || self.guard.is_active() || self.player.is_paused() {
            return;
        }
        let current_time = self.player.current_time();
        self.broadcast(&Message::SyncCheck { current_time });
    }

    /// A task scheduled through [`Scheduler::defer`] is due
    pub fn on_deferred(&mut self, task: DeferredTask) {
        match task {
            DeferredTask::RequestSync => {
                if self.party.role == Role::Joined {
                    debug!("Requesting sync from host");
                    self.broadcast(&Message::RequestSync);
                }
            }
            DeferredTask::WelcomeSync { peer_id } => {
                if self.party.is_host() && self.connections.contains(&peer_id) {
                    debug!("Sending welcome sync for {}", peer_id);
                    self.push_sync();
                    self.broadcast_roster();
                }
            }
            DeferredTask::Reconnect => self.attempt_reconnect(),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Broadcast our current position and play state
    fn push_sync(&mut self) {
        let command = ControlCommand::sync(self.player.current_time(), !self.player.is_paused());
        self.broadcast(&Message::ControlCommand(command));
    }

    /// Host only: send the canonical roster to everyone
    fn broadcast_roster(&mut self) {
        if !self.party.is_host() {
            return;
        }
        let update = self.party.roster_update();
        self.broadcast(&Message::RosterUpdate(update));
    }

    /// Fire-and-forget broadcast
    fn broadcast(&mut self, msg: &Message) {
        if let Err(e) = self.try_broadcast(msg) {
            debug!("Broadcast of {} not delivered: {}", msg.kind(), e);
        }
    }

    fn try_broadcast(&mut self, msg: &Message) -> Result<(), SessionError> {
        let payload = match msg.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode {}: {}", msg.kind(), e);
                return Ok(());
            }
        };
        self.transport.broadcast(&payload)?;
        Ok(())
    }

    fn notice_denied(&mut self) {
        let now = Instant::now();
        let throttled = self
            .last_denied_notice
            .map(|at| now.duration_since(at) < self.config.denied_notice_interval)
            .unwrap_or(false);
        if throttled {
            return;
        }
        self.last_denied_notice = Some(now);
        self.notify(Notice::ControlDenied);
    }

    /// Back to `Unattached`, dropping every bit of party state
    fn reset(&mut self) {
        let could_control = self.party.may_control();

        self.scheduler.stop_sync_checks();
        self.scheduler.cancel_deferred();
        self.guard.clear();
        self.latency.clear();
        self.connections.clear();
        self.reconnect_attempts = 0;
        self.party = Party::default();
        self.refresh_control(could_control);
    }

    /// Tell the player when `may_control` flipped since `before`
    fn refresh_control(&mut self, before: bool) {
        let now = self.party.may_control();
        if now != before {
            self.player.control_permission_changed(now);
        }
    }

    /// Tear the party down and tell the UI why
    fn end_party(&mut self, reason: &str) {
        warn!("Party ended: {}", reason);
        self.transport.close_all();
        self.reset();
        self.notify_role();
        if let Some(cb) = &self.callback {
            cb.on_party_ended(reason);
        }
    }

    fn notify(&self, notice: Notice) {
        info!("{}", notice);
        if let Some(cb) = &self.callback {
            cb.on_notice(notice);
        }
    }

    fn notify_role(&self) {
        if let Some(cb) = &self.callback {
            cb.on_role_changed(self.party.role);
        }
    }

    fn notify_roster(&self) {
        if let Some(cb) = &self.callback {
            cb.on_roster_changed(&self.snapshot());
        }
    }
}

fn log_dropped(from: &str, error: &DispatchError) {
    match error {
        DispatchError::Protocol(e) => warn!("Dropping malformed message from {}: {}", from, e),
        DispatchError::AuthorityViolation { .. } => warn!("Ignoring message: {}", error),
        DispatchError::StateInconsistency(reason) => {
            debug!("Ignoring message from {}: {}", from, reason)
        }
    }
}
