//! Session configuration

use std::time::Duration;

use rand::Rng;

use crate::sync::drift::{COARSE_THRESHOLD_SECS, FINE_THRESHOLD_SECS};
use crate::sync::guard::DEFAULT_WINDOW;
use crate::sync::SyncThresholds;

/// How often a playing participant reports its position to the host
const DEFAULT_SYNC_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Delay before a fresh joiner pulls the host's state
const DEFAULT_REQUEST_SYNC_DELAY: Duration = Duration::from_millis(500);

/// Delay before the host pushes its state to a new connection
const DEFAULT_WELCOME_DELAY: Duration = Duration::from_secs(1);

/// Reconnection attempts after a fatal transport error
const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;

/// Pause between reconnection attempts
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Minimum spacing between two "no permission" notices
const DEFAULT_DENIED_NOTICE_INTERVAL: Duration = Duration::from_secs(5);

/// Tunables of a [`Session`](crate::session::Session)
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name shown to the other members
    pub nickname: String,
    /// Drift thresholds for hard sync and periodic correction
    pub thresholds: SyncThresholds,
    pub sync_check_interval: Duration,
    /// How long local player events are ignored after applying a remote command
    pub reentrancy_window: Duration,
    pub request_sync_delay: Duration,
    pub welcome_delay: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub denied_notice_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            nickname: random_nickname(),
            thresholds: SyncThresholds {
                coarse: COARSE_THRESHOLD_SECS,
                fine: FINE_THRESHOLD_SECS,
            },
            sync_check_interval: DEFAULT_SYNC_CHECK_INTERVAL,
            reentrancy_window: DEFAULT_WINDOW,
            request_sync_delay: DEFAULT_REQUEST_SYNC_DELAY,
            welcome_delay: DEFAULT_WELCOME_DELAY,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            denied_notice_interval: DEFAULT_DENIED_NOTICE_INTERVAL,
        }
    }
}

impl SessionConfig {
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    pub fn with_thresholds(mut self, coarse: f64, fine: f64) -> Self {
        self.thresholds = SyncThresholds { coarse, fine };
        self
    }

    pub fn with_sync_check_interval(mut self, interval: Duration) -> Self {
        self.sync_check_interval = interval;
        self
    }

    pub fn with_reentrancy_window(mut self, window: Duration) -> Self {
        self.reentrancy_window = window;
        self
    }

    pub fn with_reconnect(mut self, attempts: u32, delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay = delay;
        self
    }

    pub fn with_delays(mut self, request_sync: Duration, welcome: Duration) -> Self {
        self.request_sync_delay = request_sync;
        self.welcome_delay = welcome;
        self
    }
}

/// Placeholder nickname until the user picks one
pub fn random_nickname() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1000);
    format!("User{}", n)
}
