//! Seams to the outside world: the player, timers and the UI shell

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use super::PartySnapshot;
use crate::latency::LinkQuality;
use crate::sync::{PeerId, Role};

/// The playback primitive (a video element, a music player, ...)
pub trait Player: Send {
    /// Current position in seconds
    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, secs: f64);

    fn play(&mut self);

    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    /// Our own control permission changed. The player decides whether it
    /// must now block user-initiated actions (see `Session::may_control`).
    fn control_permission_changed(&mut self, may_control: bool);
}

/// Timers owned by whoever drives the session.
///
/// Firings come back through `Session::on_sync_check_tick` and
/// `Session::on_deferred`.
pub trait Scheduler: Send {
    /// Arm the periodic sync check, replacing any running one
    fn start_sync_checks(&mut self, every: Duration);

    fn stop_sync_checks(&mut self);

    /// Run `task` once after `delay`
    fn defer(&mut self, delay: Duration, task: DeferredTask);

    /// Drop every deferred task that has not fired yet
    fn cancel_deferred(&mut self);
}

/// One-shot work the session schedules for later
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredTask {
    /// Pull the host's state after joining
    RequestSync,
    /// Push our state to a peer that just connected to us
    WelcomeSync { peer_id: PeerId },
    /// Try the host again after losing the transport
    Reconnect,
}

/// Local player events the session listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Play,
    Pause,
    Seeked,
}

/// Callback interface for the UI shell
pub trait SessionCallback: Send + Sync {
    fn on_role_changed(&self, role: Role);
    fn on_roster_changed(&self, snapshot: &PartySnapshot);
    fn on_notice(&self, notice: Notice);
    fn on_chat(&self, from: &str, sender_name: &str, message: &str);
    /// A message kind the core does not interpret
    fn on_passthrough(&self, from: &str, kind: &str, payload: &Value);
    /// The party is over for us and state has been reset
    fn on_party_ended(&self, reason: &str);
}

/// Something worth telling the user about
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Connected,
    PeerJoined { peer_id: PeerId, nickname: String },
    PeerLeft { peer_id: PeerId, nickname: String },
    HostMigrated { peer_id: PeerId, nickname: String },
    PromotedToHost,
    SyncIssuePause { host_time: f64 },
    Synced { current_time: f64 },
    PermissionGranted,
    PermissionRevoked,
    ControlDenied,
    ConnectionTestReceived { message: String },
    LinkMeasured {
        peer_id: PeerId,
        rtt_ms: u64,
        quality: LinkQuality,
    },
    Reconnecting { attempt: u32 },
    TransportError { message: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Connected => write!(f, "Successfully connected to party! Welcome to the sync session."),
            Notice::PeerJoined { nickname, .. } => write!(f, "{} joined the party.", nickname),
            Notice::PeerLeft { nickname, .. } => write!(f, "{} left the party.", nickname),
            Notice::HostMigrated { nickname, .. } => {
                write!(f, "Host disconnected. {} is now the host.", nickname)
            }
            Notice::PromotedToHost => write!(f, "Host disconnected. You are now the host."),
            Notice::SyncIssuePause { host_time } => write!(
                f,
                "Video paused due to sync issue at {:.1}s. Please wait while everyone catches up.",
                host_time
            ),
            Notice::Synced { current_time } => write!(f, "Synced to host video ({:.1}s)", current_time),
            Notice::PermissionGranted => write!(f, "You have been granted control of the video."),
            Notice::PermissionRevoked => write!(f, "Your video control permission has been revoked."),
            Notice::ControlDenied => write!(
                f,
                "You don't have permission to control the video. Ask the host for control."
            ),
            Notice::ConnectionTestReceived { message } => {
                write!(f, "Connection test received: {}", message)
            }
            Notice::LinkMeasured { rtt_ms, quality, .. } => write!(
                f,
                "Connection test response received! Latency: {}ms ({})",
                rtt_ms, quality
            ),
            Notice::Reconnecting { attempt } => {
                write!(f, "Connection lost. Attempting to reconnect (attempt {})...", attempt)
            }
            Notice::TransportError { message } => write!(f, "Error: {}", message),
        }
    }
}
