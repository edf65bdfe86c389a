//! Sync Protocol Messages
//!
//! Every message travels as one JSON object whose `type` field names its
//! kind. Kinds the core does not know are kept as raw JSON and handed to the
//! shell untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Opaque peer identity assigned by the transport
pub type PeerId = String;

/// Wire `type` values the core understands
const KNOWN_KINDS: &[&str] = &[
    "VIDEO_ACTION_REQUEST",
    "VIDEO_ACTION",
    "SYNC_CHECK",
    "REQUEST_SYNC",
    "USER_INFO",
    "USER_LIST_UPDATE",
    "CHAT_MESSAGE",
    "CONNECTION_TEST",
    "CONNECTION_TEST_RESPONSE",
];

/// Errors raised while decoding or encoding protocol messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("message has no `type` field")]
    MissingType,

    #[error("malformed {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} cannot carry a {action:?} action")]
    InvalidAction { kind: String, action: ControlAction },

    #[error("{kind} {action:?} is missing `{field}`")]
    MissingField {
        kind: String,
        action: ControlAction,
        field: &'static str,
    },

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Playback action carried by requests and commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlAction {
    #[serde(rename = "PLAY")]
    Play,
    #[serde(rename = "PAUSE")]
    Pause,
    #[serde(rename = "SEEK")]
    Seek,
    /// Hard sync pushed by the host; never valid in a request
    #[serde(rename = "sync")]
    Sync,
}

/// Advisory control request sent by a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    pub action: ControlAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
}

/// Authoritative command broadcast by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlCommand {
    pub action: ControlAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    /// Target position of a `sync` command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sync_issue: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_time: Option<f64>,
}

impl ControlCommand {
    /// Bare command with no parameters
    pub fn new(action: ControlAction) -> Self {
        Self {
            action,
            time: None,
            is_playing: None,
            current_time: None,
            sync_issue: false,
            host_time: None,
        }
    }

    /// Seek command carrying the target time and the resulting play state
    pub fn seek(time: f64, is_playing: bool) -> Self {
        Self {
            time: Some(time),
            is_playing: Some(is_playing),
            ..Self::new(ControlAction::Seek)
        }
    }

    /// Hard sync to the host's position
    pub fn sync(current_time: f64, is_playing: bool) -> Self {
        Self {
            current_time: Some(current_time),
            is_playing: Some(is_playing),
            ..Self::new(ControlAction::Sync)
        }
    }

    /// Pause issued because a participant drifted too far
    pub fn sync_issue_pause(host_time: f64) -> Self {
        Self {
            sync_issue: true,
            host_time: Some(host_time),
            ..Self::new(ControlAction::Pause)
        }
    }
}

/// Roster entry as it travels on the wire (the peer id is the map key)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub nickname: String,
    #[serde(default)]
    pub can_control: bool,
}

/// Full roster snapshot broadcast by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterUpdate {
    pub list: Vec<(PeerId, Member)>,
    #[serde(alias = "newHostId")]
    pub host_id: PeerId,
}

/// Messages exchanged between peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    // === Playback control ===
    #[serde(rename = "VIDEO_ACTION_REQUEST")]
    ControlRequest(ControlRequest),

    #[serde(rename = "VIDEO_ACTION")]
    ControlCommand(ControlCommand),

    // === Drift correction ===
    #[serde(rename_all = "camelCase")]
    SyncCheck { current_time: f64 },

    RequestSync,

    // === Membership ===
    UserInfo { nickname: String },

    #[serde(rename = "USER_LIST_UPDATE")]
    RosterUpdate(RosterUpdate),

    // === UI-level kinds ===
    #[serde(rename = "CHAT_MESSAGE", rename_all = "camelCase")]
    Chat { message: String, sender_name: String },

    ConnectionTest { message: String, timestamp: u64 },

    #[serde(rename_all = "camelCase")]
    ConnectionTestResponse {
        message: String,
        original_timestamp: u64,
        response_timestamp: u64,
    },

    /// Any other kind, forwarded unmodified
    #[serde(skip)]
    Passthrough { kind: String, payload: Value },
}

impl Message {
    /// Wire `type` of this message
    pub fn kind(&self) -> &str {
        match self {
            Message::ControlRequest(_) => "VIDEO_ACTION_REQUEST",
            Message::ControlCommand(_) => "VIDEO_ACTION",
            Message::SyncCheck { .. } => "SYNC_CHECK",
            Message::RequestSync => "REQUEST_SYNC",
            Message::UserInfo { .. } => "USER_INFO",
            Message::RosterUpdate(_) => "USER_LIST_UPDATE",
            Message::Chat { .. } => "CHAT_MESSAGE",
            Message::ConnectionTest { .. } => "CONNECTION_TEST",
            Message::ConnectionTestResponse { .. } => "CONNECTION_TEST_RESPONSE",
            Message::Passthrough { kind, .. } => kind,
        }
    }

    /// Whether only a host acts on this message when received
    pub fn handled_by_host(&self) -> bool {
        matches!(
            self,
            Message::ControlRequest(_)
                | Message::SyncCheck { .. }
                | Message::RequestSync
                | Message::UserInfo { .. }
        )
    }

    /// Serialize to the JSON text sent over the transport
    pub fn encode(&self) -> Result<String, ProtocolError> {
        match self {
            Message::Passthrough { payload, .. } => {
                serde_json::to_string(payload).map_err(ProtocolError::Encode)
            }
            other => serde_json::to_string(other).map_err(ProtocolError::Encode),
        }
    }

    /// Parse a payload received from the transport
    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(payload).map_err(ProtocolError::InvalidJson)?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        if !KNOWN_KINDS.contains(&kind.as_str()) {
            return Ok(Message::Passthrough {
                kind,
                payload: value,
            });
        }

        serde_json::from_value(value)
            .map_err(|source| ProtocolError::InvalidPayload { kind, source })
    }
}
