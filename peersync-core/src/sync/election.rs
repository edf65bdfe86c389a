//! Host succession
//!
//! When the host drops, every participant runs the same rule over its last
//! roster snapshot: the earliest remaining member becomes host. Correct only
//! as long as survivors hold identical snapshots; a second departure racing
//! the new host's first broadcast can make them disagree.

use super::protocol::PeerId;
use super::state::Roster;

/// Pick the next host from `roster`, skipping the departed one
pub fn elect_successor(roster: &Roster, departed: &str) -> Option<PeerId> {
    roster.peer_ids().find(|id| id.as_str() != departed).cloned()
}
