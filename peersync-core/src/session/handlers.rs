//! Inbound message handlers

use tracing::{debug, info, warn};

use super::{DispatchError, Notice, Session};
use crate::latency::current_time_ms;
use crate::sync::drift::{drift, evaluate_sync_check, reconcile};
use crate::sync::{
    ControlAction, ControlCommand, ControlRequest, Member, Message, PlaybackState, ProtocolError,
    Role, RosterUpdate,
};

impl Session {
    /// Apply one decoded message from `from`.
    ///
    /// Messages that fail a role or authority check come back as errors and
    /// leave the state untouched.
    pub fn handle_message(&mut self, from: &str, msg: Message) -> Result<(), DispatchError> {
        if !self.party.role.in_party() {
            return Err(DispatchError::StateInconsistency(format!(
                "{} from {} outside of a party",
                msg.kind(),
                from
            )));
        }
        if msg.handled_by_host() && !self.party.is_host() {
            return Err(DispatchError::AuthorityViolation {
                kind: msg.kind().to_string(),
                from: from.to_string(),
            });
        }

        match msg {
            Message::ControlRequest(request) => self.handle_control_request(from, request),
            Message::ControlCommand(command) => self.handle_control_command(from, command),
            Message::SyncCheck { current_time } => self.handle_sync_check(from, current_time),
            Message::RequestSync => {
                debug!("Sync requested by {}", from);
                self.push_sync();
                Ok(())
            }
            Message::UserInfo { nickname } => self.handle_user_info(from, nickname),
            Message::RosterUpdate(update) => self.handle_roster_update(from, update),
            Message::Chat {
                message,
                sender_name,
            } => {
                if let Some(cb) = &self.callback {
                    cb.on_chat(from, &sender_name, &message);
                }
                Ok(())
            }
            Message::ConnectionTest { message, timestamp } => {
                self.notify(Notice::ConnectionTestReceived { message });
                let from_role = if self.party.is_host() { "host" } else { "joiner" };
                self.broadcast(&Message::ConnectionTestResponse {
                    message: format!("Response from {}", from_role),
                    original_timestamp: timestamp,
                    response_timestamp: current_time_ms(),
                });
                Ok(())
            }
            Message::ConnectionTestResponse {
                original_timestamp, ..
            } => {
                match self.latency.handle_response(from, original_timestamp) {
                    Some(report) => self.notify(Notice::LinkMeasured {
                        peer_id: from.to_string(),
                        rtt_ms: report.rtt_ms,
                        quality: report.quality,
                    }),
                    None => debug!("Unmatched connection test response from {}", from),
                }
                Ok(())
            }
            Message::Passthrough { kind, payload } => {
                if let Some(cb) = &self.callback {
                    cb.on_passthrough(from, &kind, &payload);
                }
                Ok(())
            }
        }
    }

    /// Host: validate a participant's request, apply it, relay it once
    fn handle_control_request(&mut self, from: &str, request: ControlRequest) -> Result<(), DispatchError> {
        const KIND: &str = "VIDEO_ACTION_REQUEST";
        let permitted = self
            .party
            .roster
            .get(from)
            .map(|m| m.can_control)
            .unwrap_or(false);
        if !permitted {
            return Err(DispatchError::AuthorityViolation {
                kind: KIND.to_string(),
                from: from.to_string(),
            });
        }

        match request.action {
            ControlAction::Sync => {
                return Err(ProtocolError::InvalidAction {
                    kind: KIND.to_string(),
                    action: ControlAction::Sync,
                }
                .into());
            }
            ControlAction::Seek if request.time.is_none() => {
                return Err(ProtocolError::MissingField {
                    kind: KIND.to_string(),
                    action: ControlAction::Seek,
                    field: "time",
                }
                .into());
            }
            _ => {}
        }

        info!("Routing {:?} request from {}", request.action, from);
        self.guard.arm();
        let command = match request.action {
            ControlAction::Play => {
                self.player.play();
                ControlCommand::new(ControlAction::Play)
            }
            ControlAction::Pause => {
                self.player.pause();
                ControlCommand::new(ControlAction::Pause)
            }
            ControlAction::Seek => {
                if let Some(time) = request.time {
                    self.player.set_current_time(time);
                }
                self.apply_play_state(request.is_playing);
                // Relay where the host ended up, not what was asked
                ControlCommand::seek(self.player.current_time(), !self.player.is_paused())
            }
            ControlAction::Sync => return Ok(()),
        };

        self.broadcast(&Message::ControlCommand(command));
        Ok(())
    }

    /// Participant: obey the host
    fn handle_control_command(&mut self, from: &str, command: ControlCommand) -> Result<(), DispatchError> {
        const KIND: &str = "VIDEO_ACTION";
        match self.party.role {
            Role::Joined if self.party.is_host_peer(from) => {}
            Role::Joined | Role::Hosting => {
                return Err(DispatchError::AuthorityViolation {
                    kind: KIND.to_string(),
                    from: from.to_string(),
                });
            }
            role => {
                return Err(DispatchError::StateInconsistency(format!(
                    "{} from {} while {:?}",
                    KIND, from, role
                )));
            }
        }

        match command.action {
            ControlAction::Play => {
                self.guard.arm();
                self.player.play();
            }
            ControlAction::Pause => {
                self.guard.arm();
                self.player.pause();
                if command.sync_issue {
                    if let Some(host_time) = command.host_time {
                        // Line up with the host while everyone is stalled
                        if drift(self.player.current_time(), host_time) > self.config.thresholds.fine {
                            self.player.set_current_time(host_time);
                        }
                        self.notify(Notice::SyncIssuePause { host_time });
                    }
                }
            }
            ControlAction::Seek => {
                let time = command.time.ok_or_else(|| ProtocolError::MissingField {
                    kind: KIND.to_string(),
                    action: ControlAction::Seek,
                    field: "time",
                })?;
                self.guard.arm();
                self.player.set_current_time(time);
                self.apply_play_state(command.is_playing);
            }
            ControlAction::Sync => {
                let host_time = command
                    .current_time
                    .or(command.time)
                    .ok_or_else(|| ProtocolError::MissingField {
                        kind: KIND.to_string(),
                        action: ControlAction::Sync,
                        field: "currentTime",
                    })?;
                self.apply_sync(host_time, command.is_playing);
            }
        }
        Ok(())
    }

    /// Hard sync: seek only past the coarse threshold, always match play state
    fn apply_sync(&mut self, host_time: f64, host_playing: Option<bool>) {
        let local = PlaybackState {
            current_time: self.player.current_time(),
            is_playing: !self.player.is_paused(),
        };
        let host = PlaybackState {
            current_time: host_time,
            is_playing: host_playing.unwrap_or(local.is_playing),
        };

        let plan = reconcile(local, host, &self.config.thresholds);
        if !plan.is_noop() {
            self.guard.arm();
            if let Some(time) = plan.seek_to {
                self.player.set_current_time(time);
            }
            self.apply_play_state(plan.set_playing);
        }
        self.notify(Notice::Synced {
            current_time: host_time,
        });
    }

    fn apply_play_state(&mut self, is_playing: Option<bool>) {
        match is_playing {
            Some(true) => self.player.play(),
            Some(false) => self.player.pause(),
            None => {}
        }
    }

    /// Host: stall everyone when a participant drifted too far
    fn handle_sync_check(&mut self, from: &str, reported: f64) -> Result<(), DispatchError> {
        if self.player.is_paused() {
            return Ok(());
        }

        let host_time = self.player.current_time();
        if let Some(host_time) = evaluate_sync_check(reported, host_time, &self.config.thresholds) {
            info!(
                "{} drifted to {:.2}s (host at {:.2}s), pausing everyone",
                from, reported, host_time
            );
            self.guard.arm();
            self.player.pause();
            self.broadcast(&Message::ControlCommand(ControlCommand::sync_issue_pause(host_time)));
            self.notify(Notice::SyncIssuePause { host_time });
        }
        Ok(())
    }

    /// Host: register or rename a member and publish the roster
    fn handle_user_info(&mut self, from: &str, nickname: String) -> Result<(), DispatchError> {
        let existing = self.party.roster.get(from).map(|m| m.can_control);
        self.party.roster.insert(
            from.to_string(),
            Member {
                nickname: nickname.clone(),
                can_control: existing.unwrap_or(false),
            },
        );

        if existing.is_none() {
            self.notify(Notice::PeerJoined {
                peer_id: from.to_string(),
                nickname,
            });
        }
        self.broadcast_roster();
        self.notify_roster();
        Ok(())
    }

    /// Participant: adopt the host's roster wholesale
    fn handle_roster_update(&mut self, from: &str, update: RosterUpdate) -> Result<(), DispatchError> {
        const KIND: &str = "USER_LIST_UPDATE";
        match self.party.role {
            Role::Joined if update.host_id != from => {
                return Err(DispatchError::AuthorityViolation {
                    kind: KIND.to_string(),
                    from: from.to_string(),
                });
            }
            Role::Joined if self.party.is_host_peer(from) => {}
            // The successor saw the host leave before we did
            Role::Joined if self.is_elected_successor(from) => {
                if let Some(departed) = self.party.host_peer_id.clone() {
                    self.follow_new_host(&departed, from.to_string());
                }
            }
            Role::Joined | Role::Hosting => {
                return Err(DispatchError::AuthorityViolation {
                    kind: KIND.to_string(),
                    from: from.to_string(),
                });
            }
            role => {
                return Err(DispatchError::StateInconsistency(format!(
                    "{} from {} while {:?}",
                    KIND, from, role
                )));
            }
        }

        if !update.list.iter().any(|(id, _)| *id == update.host_id) {
            warn!("Roster from {} does not list its host; applying anyway", from);
        }

        let could_control = self.party.may_control();
        let changed = self.party.apply_roster(update);
        self.refresh_control(could_control);
        self.notify_roster();

        if let Some(can_control) = changed {
            self.notify(if can_control {
                Notice::PermissionGranted
            } else {
                Notice::PermissionRevoked
            });
        }
        Ok(())
    }
}
