//! Re-entrancy guard
//!
//! Applying a remote command to the player fires the same local events a
//! user action would. While the guard is armed those events are not turned
//! into outbound messages. It disarms itself once the window has elapsed.

use std::time::{Duration, Instant};

/// Default suppression window after a programmatic player mutation
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct ReentrancyGuard {
    window: Duration,
    armed_until: Option<Instant>,
}

impl ReentrancyGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            armed_until: None,
        }
    }

    /// Arm before mutating the player; re-arming extends the window
    pub fn arm(&mut self) {
        self.arm_at(Instant::now());
    }

    /// Whether local events are currently being suppressed
    pub fn is_active(&self) -> bool {
        self.is_active_at(Instant::now())
    }

    /// Drop any pending suppression (party reset)
    pub fn clear(&mut self) {
        self.armed_until = None;
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn arm_at(&mut self, now: Instant) {
        self.armed_until = Some(now + self.window);
    }

    fn is_active_at(&self, now: Instant) -> bool {
        self.armed_until.map(|until| now < until).unwrap_or(false)
    }
}

impl Default for ReentrancyGuard {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
