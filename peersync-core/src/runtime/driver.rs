//! Session driver
//!
//! Runs a [`Session`] inside one tokio task. Transport events, player
//! events, timer firings and user commands all go through a single queue,
//! so the session sees them strictly one at a time.

use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::scheduler::TokioScheduler;
use crate::config::SessionConfig;
use crate::network::{PartyCode, Transport, TransportEvent};
use crate::session::{
    DeferredTask, PartySnapshot, PlaybackEvent, Player, Session, SessionCallback, SessionError,
};

/// Driver errors
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Session task closed")]
    Closed,

    #[error(transparent)]
    Session(#[from] SessionError),
}

type Reply<T> = oneshot::Sender<T>;

/// Inputs accepted by the driver task
#[derive(Debug)]
pub enum DriverCommand {
    Transport(TransportEvent),
    Local(PlaybackEvent),
    SyncCheckTick,
    Deferred(DeferredTask),
    CreateParty {
        local_peer_id: String,
        reply: Reply<Result<PartyCode, SessionError>>,
    },
    JoinParty {
        local_peer_id: String,
        party_code: String,
        reply: Reply<Result<(), SessionError>>,
    },
    LeaveParty {
        reply: Reply<Result<(), SessionError>>,
    },
    SetMemberControl {
        peer_id: String,
        can_control: bool,
        reply: Reply<Result<(), SessionError>>,
    },
    ToggleMemberControl {
        peer_id: String,
        reply: Reply<Result<bool, SessionError>>,
    },
    SetNickname {
        nickname: String,
    },
    SendChat {
        message: String,
        reply: Reply<Result<(), SessionError>>,
    },
    TestConnection {
        reply: Reply<Result<(), SessionError>>,
    },
    Snapshot {
        reply: Reply<PartySnapshot>,
    },
    Shutdown,
}

/// Spawns and owns the session task
pub struct SessionDriver;

impl SessionDriver {
    /// Build a session around `transport` and `player` and start driving it
    /// on `runtime`.
    pub fn spawn(
        runtime: &Handle,
        config: SessionConfig,
        transport: Box<dyn Transport>,
        player: Box<dyn Player>,
        callback: Option<Arc<dyn SessionCallback>>,
    ) -> DriverHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler::new(runtime.clone(), command_tx.clone());

        let mut session = Session::new(config, transport, player, Box::new(scheduler));
        if let Some(cb) = callback {
            session.set_callback(cb);
        }

        runtime.spawn(run(session, command_rx));
        DriverHandle { command_tx }
    }
}

/// Process inputs until shutdown
async fn run(mut session: Session, mut command_rx: mpsc::UnboundedReceiver<DriverCommand>) {
    info!("Session driver started");

    while let Some(cmd) = command_rx.recv().await {
        match cmd {
            DriverCommand::Transport(event) => session.handle_transport_event(event),
            DriverCommand::Local(event) => session.handle_local_event(event),
            DriverCommand::SyncCheckTick => session.on_sync_check_tick(),
            DriverCommand::Deferred(task) => session.on_deferred(task),
            DriverCommand::CreateParty {
                local_peer_id,
                reply,
            } => {
                let _ = reply.send(session.create_party(local_peer_id));
            }
            DriverCommand::JoinParty {
                local_peer_id,
                party_code,
                reply,
            } => {
                let _ = reply.send(session.join_party(local_peer_id, &party_code));
            }
            DriverCommand::LeaveParty { reply } => {
                let _ = reply.send(session.leave_party());
            }
            DriverCommand::SetMemberControl {
                peer_id,
                can_control,
                reply,
            } => {
                let _ = reply.send(session.set_member_control(&peer_id, can_control));
            }
            DriverCommand::ToggleMemberControl { peer_id, reply } => {
                let _ = reply.send(session.toggle_member_control(&peer_id));
            }
            DriverCommand::SetNickname { nickname } => session.set_nickname(nickname),
            DriverCommand::SendChat { message, reply } => {
                let _ = reply.send(session.send_chat(&message));
            }
            DriverCommand::TestConnection { reply } => {
                let _ = reply.send(session.test_connection());
            }
            DriverCommand::Snapshot { reply } => {
                let _ = reply.send(session.snapshot());
            }
            DriverCommand::Shutdown => {
                if session.role().in_party() {
                    let _ = session.leave_party();
                }
                break;
            }
        }
    }

    info!("Session driver stopped");
}

/// Handle to communicate with a running session
#[derive(Clone)]
pub struct DriverHandle {
    command_tx: mpsc::UnboundedSender<DriverCommand>,
}

impl DriverHandle {
    fn send(&self, cmd: DriverCommand) -> Result<(), DriverError> {
        self.command_tx.send(cmd).map_err(|_| DriverError::Closed)
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> DriverCommand) -> Result<T, DriverError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx))?;
        reply_rx.await.map_err(|_| DriverError::Closed)
    }

    pub fn transport_event(&self, event: TransportEvent) -> Result<(), DriverError> {
        self.send(DriverCommand::Transport(event))
    }

    pub fn local_event(&self, event: PlaybackEvent) -> Result<(), DriverError> {
        self.send(DriverCommand::Local(event))
    }

    /// Pump every event from `events` into the session until either side closes
    pub fn forward_transport_events(
        &self,
        runtime: &Handle,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> JoinHandle<()> {
        let handle = self.clone();
        runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                if handle.transport_event(event).is_err() {
                    debug!("Session gone, dropping transport events");
                    break;
                }
            }
        })
    }

    pub async fn create_party(&self, local_peer_id: &str) -> Result<PartyCode, DriverError> {
        let local_peer_id = local_peer_id.to_string();
        Ok(self
            .request(|reply| DriverCommand::CreateParty {
                local_peer_id,
                reply,
            })
            .await??)
    }

    pub async fn join_party(&self, local_peer_id: &str, party_code: &str) -> Result<(), DriverError> {
        let local_peer_id = local_peer_id.to_string();
        let party_code = party_code.to_string();
        Ok(self
            .request(|reply| DriverCommand::JoinParty {
                local_peer_id,
                party_code,
                reply,
            })
            .await??)
    }

    pub async fn leave_party(&self) -> Result<(), DriverError> {
        Ok(self
            .request(|reply| DriverCommand::LeaveParty { reply })
            .await??)
    }

    pub async fn set_member_control(&self, peer_id: &str, can_control: bool) -> Result<(), DriverError> {
        let peer_id = peer_id.to_string();
        Ok(self
            .request(|reply| DriverCommand::SetMemberControl {
                peer_id,
                can_control,
                reply,
            })
            .await??)
    }

    pub async fn toggle_member_control(&self, peer_id: &str) -> Result<bool, DriverError> {
        let peer_id = peer_id.to_string();
        Ok(self
            .request(|reply| DriverCommand::ToggleMemberControl { peer_id, reply })
            .await??)
    }

    pub fn set_nickname(&self, nickname: &str) -> Result<(), DriverError> {
        self.send(DriverCommand::SetNickname {
            nickname: nickname.to_string(),
        })
    }

    pub async fn send_chat(&self, message: &str) -> Result<(), DriverError> {
        let message = message.to_string();
        Ok(self
            .request(|reply| DriverCommand::SendChat { message, reply })
            .await??)
    }

    pub async fn test_connection(&self) -> Result<(), DriverError> {
        Ok(self
            .request(|reply| DriverCommand::TestConnection { reply })
            .await??)
    }

    pub async fn snapshot(&self) -> Result<PartySnapshot, DriverError> {
        self.request(|reply| DriverCommand::Snapshot { reply }).await
    }

    /// Leave any party and stop the task
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(DriverCommand::Shutdown);
    }
}
