//! Drift detection and reconciliation
//!
//! The host compares participants' reported positions against its own and
//! stalls the party when they disagree; participants reconcile against
//! `sync` commands pushed by the host.

use super::state::PlaybackState;

/// Drift beyond which a `sync` command moves the local position (seconds)
pub const COARSE_THRESHOLD_SECS: f64 = 1.0;

/// Drift beyond which a sync check stalls the party (seconds)
pub const FINE_THRESHOLD_SECS: f64 = 0.5;

/// The two drift thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncThresholds {
    /// Used for hard resync on join/request
    pub coarse: f64,
    /// Used for periodic drift correction
    pub fine: f64,
}

impl Default for SyncThresholds {
    fn default() -> Self {
        Self {
            coarse: COARSE_THRESHOLD_SECS,
            fine: FINE_THRESHOLD_SECS,
        }
    }
}

/// Absolute difference between two positions
pub fn drift(a: f64, b: f64) -> f64 {
    (a - b).abs()
}

/// Host-side evaluation of a participant's sync check.
///
/// Returns the host time to stall at when the reported position is too far
/// from ours, `None` when the participant is close enough.
pub fn evaluate_sync_check(reported: f64, host_time: f64, thresholds: &SyncThresholds) -> Option<f64> {
    (drift(reported, host_time) > thresholds.fine).then_some(host_time)
}

/// What a participant must do to match a `sync` command
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reconciliation {
    /// New position, if drift exceeded the coarse threshold
    pub seek_to: Option<f64>,
    /// New play state, if it differs from ours
    pub set_playing: Option<bool>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.seek_to.is_none() && self.set_playing.is_none()
    }
}

/// Participant-side reconciliation against the host's state.
///
/// Small drift is ignored to avoid visible jitter; play state always follows
/// the host exactly.
pub fn reconcile(local: PlaybackState, host: PlaybackState, thresholds: &SyncThresholds) -> Reconciliation {
    let seek_to = (drift(local.current_time, host.current_time) > thresholds.coarse)
        .then_some(host.current_time);
    let set_playing = (local.is_playing != host.is_playing).then_some(host.is_playing);

    Reconciliation {
        seek_to,
        set_playing,
    }
}
