//! FFI types exposed via uniffi

use crate::runtime::DriverError;
use crate::session::{MemberView, PartySnapshot, SessionError};
use crate::network::PartyCode;
use crate::sync::Role;

/// Error types exposed via FFI
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CoreError {
    #[error("Already in a party")]
    AlreadyInParty,

    #[error("Not in a party")]
    NotInParty,

    #[error("Not the host")]
    NotHost,

    #[error("Invalid party code: {0}")]
    InvalidPartyCode(String),

    #[error("Unknown member: {0}")]
    UnknownMember(String),

    #[error("The host always keeps control")]
    HostPermissionFixed,

    #[error("Chat message is empty")]
    EmptyMessage,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Session closed")]
    SessionClosed,
}

impl From<SessionError> for CoreError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::AlreadyInParty => CoreError::AlreadyInParty,
            SessionError::NotInParty => CoreError::NotInParty,
            SessionError::NotHost => CoreError::NotHost,
            SessionError::InvalidPartyCode(code) => CoreError::InvalidPartyCode(code),
            SessionError::UnknownMember(peer_id) => CoreError::UnknownMember(peer_id),
            SessionError::HostPermissionFixed => CoreError::HostPermissionFixed,
            SessionError::EmptyMessage => CoreError::EmptyMessage,
            SessionError::Transport(e) => CoreError::NetworkError(e.to_string()),
        }
    }
}

impl From<DriverError> for CoreError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::Closed => CoreError::SessionClosed,
            DriverError::Session(e) => e.into(),
        }
    }
}

/// Role of the local peer exposed via FFI
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum PartyRole {
    Unattached,
    Hosting,
    Joining,
    Joined,
    Disconnected,
}

impl From<Role> for PartyRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Unattached => PartyRole::Unattached,
            Role::Hosting => PartyRole::Hosting,
            Role::Joining => PartyRole::Joining,
            Role::Joined => PartyRole::Joined,
            Role::Disconnected => PartyRole::Disconnected,
        }
    }
}

/// Party member exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct MemberRecord {
    pub peer_id: String,
    pub nickname: String,
    pub can_control: bool,
    pub is_host: bool,
}

impl From<MemberView> for MemberRecord {
    fn from(m: MemberView) -> Self {
        Self {
            peer_id: m.peer_id,
            nickname: m.nickname,
            can_control: m.can_control,
            is_host: m.is_host,
        }
    }
}

/// Party state exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct PartyState {
    pub role: PartyRole,
    pub local_peer_id: Option<String>,
    pub host_peer_id: Option<String>,
    /// Abbreviated party code for display
    pub party_code: Option<String>,
    pub members: Vec<MemberRecord>,
    /// Whether local play/pause/seek is currently allowed
    pub can_control: bool,
}

impl From<PartySnapshot> for PartyState {
    fn from(s: PartySnapshot) -> Self {
        Self {
            role: s.role.into(),
            party_code: s
                .host_peer_id
                .as_deref()
                .map(|id| PartyCode::from_peer_id(id).short()),
            local_peer_id: s.local_peer_id,
            host_peer_id: s.host_peer_id,
            members: s.members.into_iter().map(MemberRecord::from).collect(),
            can_control: s.can_control,
        }
    }
}

/// Callback interface for the UI shell
#[uniffi::export(callback_interface)]
pub trait PartyCallback: Send + Sync {
    fn on_role_changed(&self, role: PartyRole);
    fn on_party_state_changed(&self, state: PartyState);
    /// Human-readable status line
    fn on_notice(&self, message: String);
    fn on_chat(&self, from: String, sender_name: String, message: String);
    /// A message the core does not interpret, as raw JSON
    fn on_passthrough(&self, from: String, kind: String, payload_json: String);
    fn on_party_ended(&self, reason: String);
}

/// The media element being kept in sync
#[uniffi::export(callback_interface)]
pub trait PlaybackDelegate: Send + Sync {
    fn current_time(&self) -> f64;
    fn set_current_time(&self, secs: f64);
    fn play(&self);
    fn pause(&self);
    fn is_paused(&self) -> bool;
    /// Block or unblock user-initiated play/pause/seek
    fn control_permission_changed(&self, may_control: bool);
}

/// Data channels provided by the shell (typically WebRTC)
#[uniffi::export(callback_interface)]
pub trait TransportDelegate: Send + Sync {
    /// Start opening a channel to `target`. Returns false if that's impossible
    /// right away; otherwise completion is reported through
    /// `PartySession::connection_opened`.
    fn connect(&self, target: String) -> bool;
    /// Send on every open channel. Returns false if no channel is open.
    fn broadcast(&self, payload: String) -> bool;
    fn close_all(&self);
}
