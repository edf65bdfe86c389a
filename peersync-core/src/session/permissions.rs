//! Host-side permission controller

use tracing::{debug, info};

use super::{Session, SessionError};

impl Session {
    /// Grant or revoke a participant's control permission.
    ///
    /// Only the host may call this. The new roster goes out to everyone so
    /// each participant re-derives its own permission from it.
    pub fn set_member_control(&mut self, peer_id: &str, can_control: bool) -> Result<(), SessionError> {
        self.check_can_manage(peer_id)?;

        let member = self
            .party
            .roster
            .get_mut(peer_id)
            .ok_or_else(|| SessionError::UnknownMember(peer_id.to_string()))?;

        if member.can_control == can_control {
            debug!("{} already has can_control={}", peer_id, can_control);
            return Ok(());
        }
        member.can_control = can_control;
        info!(
            "{} control for {} ({})",
            if can_control { "Granted" } else { "Revoked" },
            member.nickname,
            peer_id
        );

        self.broadcast_roster();
        self.notify_roster();
        Ok(())
    }

    /// Flip a participant's permission. Returns the new value.
    pub fn toggle_member_control(&mut self, peer_id: &str) -> Result<bool, SessionError> {
        self.check_can_manage(peer_id)?;
        let current = self
            .party
            .roster
            .get(peer_id)
            .map(|m| m.can_control)
            .ok_or_else(|| SessionError::UnknownMember(peer_id.to_string()))?;
        self.set_member_control(peer_id, !current)?;
        Ok(!current)
    }

    fn check_can_manage(&self, peer_id: &str) -> Result<(), SessionError> {
        if !self.party.role.in_party() {
            return Err(SessionError::NotInParty);
        }
        if !self.party.is_host() {
            return Err(SessionError::NotHost);
        }
        if self.party.is_host_peer(peer_id) {
            return Err(SessionError::HostPermissionFixed);
        }
        Ok(())
    }
}
