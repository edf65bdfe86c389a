//! Connection lifecycle: joining, departures, host migration and reconnection

use tracing::{debug, info, warn};

use super::{DeferredTask, Notice, Session};
use crate::sync::{elect_successor, Message, PeerId, Role};

impl Session {
    pub(super) fn handle_connection_open(&mut self, peer_id: PeerId) {
        if !self.connections.contains(&peer_id) {
            self.connections.push(peer_id.clone());
        }

        match self.party.role {
            Role::Joining if self.party.is_host_peer(&peer_id) => self.on_joined(),
            Role::Hosting => {
                info!("Peer connected: {}", peer_id);
                self.scheduler
                    .defer(self.config.welcome_delay, DeferredTask::WelcomeSync { peer_id });
            }
            role => debug!("Channel to {} opened while {:?}", peer_id, role),
        }
    }

    /// The channel to the host is up: introduce ourselves and start syncing
    fn on_joined(&mut self) {
        info!("Connected to host {}", self.party.host_peer_id.as_deref().unwrap_or_default());
        self.party.role = Role::Joined;
        self.reconnect_attempts = 0;
        self.notify_role();
        self.notify(Notice::Connected);

        self.broadcast(&Message::UserInfo {
            nickname: self.config.nickname.clone(),
        });
        self.scheduler
            .defer(self.config.request_sync_delay, DeferredTask::RequestSync);
        self.scheduler
            .start_sync_checks(self.config.sync_check_interval);
    }

    pub(super) fn handle_connection_closed(&mut self, peer_id: PeerId) {
        self.connections.retain(|p| *p != peer_id);

        match self.party.role {
            Role::Hosting => match self.party.roster.remove(&peer_id) {
                Some(member) => {
                    info!("Peer disconnected: {}", peer_id);
                    self.notify(Notice::PeerLeft {
                        peer_id,
                        nickname: member.nickname,
                    });
                    self.broadcast_roster();
                    self.notify_roster();
                }
                None => debug!("Unregistered peer {} disconnected", peer_id),
            },
            Role::Joined if self.party.is_host_peer(&peer_id) => self.handle_host_lost(&peer_id),
            Role::Joining if self.party.is_host_peer(&peer_id) => {
                self.connection_failed("Connection to host closed")
            }
            role => debug!("Channel to {} closed while {:?}", peer_id, role),
        }
    }

    /// The host is gone: every participant runs the same election over the
    /// same roster, so they all agree on the successor without talking.
    fn handle_host_lost(&mut self, departed: &str) {
        let successor = elect_successor(&self.party.roster, departed);
        self.party.roster.remove(departed);

        match successor {
            Some(next) if next == self.party.local_id() => {
                info!("Host {} left, taking over", departed);
                let could_control = self.party.may_control();
                self.party.promote_self();
                self.scheduler.stop_sync_checks();
                self.refresh_control(could_control);

                self.notify_role();
                self.notify(Notice::PromotedToHost);
                self.broadcast_roster();
                self.notify_roster();
            }
            Some(next) => {
                self.follow_new_host(departed, next);
                self.notify_roster();
            }
            None => self.end_party("The host has disconnected. The party is over."),
        }
    }

    /// Whether `peer_id` is who the election picks if the current host leaves
    pub(super) fn is_elected_successor(&self, peer_id: &str) -> bool {
        match self.party.host_peer_id.as_deref() {
            Some(host) => elect_successor(&self.party.roster, host).as_deref() == Some(peer_id),
            None => false,
        }
    }

    /// Treat `next` as host from now on
    pub(super) fn follow_new_host(&mut self, departed: &str, next: PeerId) {
        let nickname = self
            .party
            .roster
            .get(&next)
            .map(|m| m.nickname.clone())
            .unwrap_or_else(|| next.clone());
        info!("Host {} left, {} takes over", departed, next);
        self.party.host_peer_id = Some(next.clone());

        self.notify(Notice::HostMigrated {
            peer_id: next,
            nickname,
        });
    }

    pub(super) fn handle_transport_error(&mut self, peer_id: Option<PeerId>, message: String, fatal: bool) {
        warn!(
            "Transport error (peer: {}, fatal: {}): {}",
            peer_id.as_deref().unwrap_or("-"),
            fatal,
            message
        );
        self.notify(Notice::TransportError {
            message: message.clone(),
        });

        let concerns_host = peer_id
            .as_deref()
            .map(|p| self.party.is_host_peer(p))
            .unwrap_or(true);

        match self.party.role {
            Role::Joining if concerns_host => self.connection_failed(&message),
            Role::Joined if fatal => self.connection_failed(&message),
            Role::Hosting | Role::Disconnected if fatal => {
                self.end_party(&format!("Connection lost: {}", message))
            }
            _ => {}
        }
    }

    /// The link to the host is down. Retry while attempts remain; a join that
    /// never succeeded is not retried.
    fn connection_failed(&mut self, reason: &str) {
        let never_joined = self.party.role == Role::Joining && self.reconnect_attempts == 0;
        if never_joined || self.reconnect_attempts >= self.config.reconnect_attempts {
            self.end_party(reason);
            return;
        }

        let could_control = self.party.may_control();
        self.party.role = Role::Disconnected;
        self.party.can_control = false;
        self.scheduler.stop_sync_checks();
        self.guard.clear();
        self.connections.clear();
        self.refresh_control(could_control);
        self.notify_role();
        self.notify(Notice::Reconnecting {
            attempt: self.reconnect_attempts + 1,
        });
        self.scheduler
            .defer(self.config.reconnect_delay, DeferredTask::Reconnect);
    }

    pub(super) fn attempt_reconnect(&mut self) {
        if self.party.role != Role::Disconnected {
            return;
        }
        let Some(host) = self.party.host_peer_id.clone() else {
            self.end_party("No host to reconnect to");
            return;
        };

        self.reconnect_attempts += 1;
        info!(
            "Reconnecting to {} (attempt {}/{})",
            host, self.reconnect_attempts, self.config.reconnect_attempts
        );
        self.party.role = Role::Joining;
        self.notify_role();

        if let Err(e) = self.transport.connect(&host) {
            self.connection_failed(&e.to_string());
        }
    }
}
