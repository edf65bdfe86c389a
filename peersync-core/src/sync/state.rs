//! Party State Management

use super::protocol::{Member, PeerId, RosterUpdate};

/// Where the local peer stands in the party lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Not in any party
    Unattached,
    /// We are the host
    Hosting,
    /// Connecting to a host
    Joining,
    /// Connected to a host as a participant
    Joined,
    /// Lost the transport, waiting to reconnect to the host
    Disconnected,
}

impl Role {
    /// Whether we belong to a party (possibly while reconnecting)
    pub fn in_party(&self) -> bool {
        !matches!(self, Role::Unattached)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Unattached
    }
}

/// Playback position and play state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub current_time: f64,
    pub is_playing: bool,
}

/// Ordered peer id → member mapping; insertion order decides host succession
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    entries: Vec<(PeerId, Member)>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from a received snapshot, keeping its order
    pub fn from_list(list: Vec<(PeerId, Member)>) -> Self {
        let mut roster = Self::new();
        for (peer_id, member) in list {
            roster.insert(peer_id, member);
        }
        roster
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.position(peer_id).is_some()
    }

    pub fn get(&self, peer_id: &str) -> Option<&Member> {
        self.position(peer_id).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, peer_id: &str) -> Option<&mut Member> {
        self.position(peer_id).map(move |i| &mut self.entries[i].1)
    }

    /// Add a member, or replace an existing one in place (order unchanged)
    pub fn insert(&mut self, peer_id: PeerId, member: Member) {
        match self.position(&peer_id) {
            Some(i) => self.entries[i].1 = member,
            None => self.entries.push((peer_id, member)),
        }
    }

    pub fn remove(&mut self, peer_id: &str) -> Option<Member> {
        self.position(peer_id).map(|i| self.entries.remove(i).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &Member)> {
        self.entries.iter().map(|(id, m)| (id, m))
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = &PeerId> {
        self.entries.iter().map(|(id, _)| id)
    }

    /// Snapshot suitable for a roster broadcast
    pub fn to_list(&self) -> Vec<(PeerId, Member)> {
        self.entries.clone()
    }

    fn position(&self, peer_id: &str) -> Option<usize> {
        self.entries.iter().position(|(id, _)| id == peer_id)
    }
}

/// Local view of the party we're in (or not)
#[derive(Debug, Clone, Default)]
pub struct Party {
    pub role: Role,
    /// Our peer ID, assigned by the transport
    pub local_peer_id: Option<PeerId>,
    /// Current host's peer ID
    pub host_peer_id: Option<PeerId>,
    /// Members, including ourselves
    pub roster: Roster,
    /// Our own control permission, derived from the last roster
    pub can_control: bool,
}

impl Party {
    /// A fresh party with ourselves as the only member and host
    pub fn new_as_host(local_peer_id: PeerId, nickname: String) -> Self {
        let mut roster = Roster::new();
        roster.insert(
            local_peer_id.clone(),
            Member {
                nickname,
                can_control: true,
            },
        );

        Self {
            role: Role::Hosting,
            local_peer_id: Some(local_peer_id.clone()),
            host_peer_id: Some(local_peer_id),
            roster,
            can_control: true,
        }
    }

    /// A party we're about to join through `host_peer_id`
    pub fn new_joining(local_peer_id: PeerId, host_peer_id: PeerId) -> Self {
        Self {
            role: Role::Joining,
            local_peer_id: Some(local_peer_id),
            host_peer_id: Some(host_peer_id),
            roster: Roster::new(),
            can_control: false,
        }
    }

    /// Check if we are the host
    pub fn is_host(&self) -> bool {
        self.role == Role::Hosting
    }

    /// Check if `peer_id` is the current host
    pub fn is_host_peer(&self, peer_id: &str) -> bool {
        self.host_peer_id.as_deref() == Some(peer_id)
    }

    pub fn local_id(&self) -> &str {
        self.local_peer_id.as_deref().unwrap_or_default()
    }

    /// Whether local control actions are allowed right now
    pub fn may_control(&self) -> bool {
        match self.role {
            Role::Unattached | Role::Hosting => true,
            Role::Joined => self.can_control,
            Role::Joining | Role::Disconnected => false,
        }
    }

    /// Replace the roster wholesale from a broadcast.
    /// Returns the new own permission if it changed.
    pub fn apply_roster(&mut self, update: RosterUpdate) -> Option<bool> {
        self.roster = Roster::from_list(update.list);
        self.host_peer_id = Some(update.host_id);

        let had_control = self.can_control;
        self.can_control = self
            .roster
            .get(self.local_id())
            .map(|m| m.can_control)
            .unwrap_or(false);

        (had_control != self.can_control).then_some(self.can_control)
    }

    /// Snapshot for broadcasting; the host entry always carries control
    pub fn roster_update(&self) -> RosterUpdate {
        let host_id = self.host_peer_id.clone().unwrap_or_default();
        let list = self
            .roster
            .iter()
            .map(|(id, member)| {
                let mut member = member.clone();
                if *id == host_id {
                    member.can_control = true;
                }
                (id.clone(), member)
            })
            .collect();
        RosterUpdate { list, host_id }
    }

    /// Take over as host after the previous one left
    pub fn promote_self(&mut self) {
        let local_id = self.local_id().to_string();
        self.role = Role::Hosting;
        self.can_control = true;
        if let Some(me) = self.roster.get_mut(&local_id) {
            me.can_control = true;
        }
        self.host_peer_id = Some(local_id);
    }

    /// Number of roster entries matching the current host id
    pub fn host_count(&self) -> usize {
        self.roster
            .peer_ids()
            .filter(|id| self.is_host_peer(id))
            .count()
    }
}
