//! Simulated media element
//!
//! Time advances with the wall clock while playing, scaled by a per-peer
//! rate so that participants slowly drift apart like real players do.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use peersync_core::Player;
use rand::Rng;

/// Largest rate deviation from 1.0 a simulated player may get
const MAX_RATE_SKEW: f64 = 0.05;

struct Deck {
    /// Position at `anchor`
    position: f64,
    /// Set while playing
    anchor: Option<Instant>,
    rate: f64,
}

impl Deck {
    fn now(&self) -> f64 {
        match self.anchor {
            Some(at) => self.position + at.elapsed().as_secs_f64() * self.rate,
            None => self.position,
        }
    }
}

/// Cheap handle onto one simulated player, shared by the session and the scenario
#[derive(Clone)]
pub struct SimPlayer {
    deck: Arc<Mutex<Deck>>,
    may_control: Arc<Mutex<bool>>,
}

impl SimPlayer {
    /// A paused player at zero with a random rate skew
    pub fn new() -> Self {
        let rate = 1.0 + rand::thread_rng().gen_range(-MAX_RATE_SKEW..=MAX_RATE_SKEW);
        Self {
            deck: Arc::new(Mutex::new(Deck {
                position: 0.0,
                anchor: None,
                rate,
            })),
            may_control: Arc::new(Mutex::new(true)),
        }
    }

    pub fn rate(&self) -> f64 {
        self.deck.lock().rate
    }

    pub fn position(&self) -> f64 {
        self.deck.lock().now()
    }

    pub fn playing(&self) -> bool {
        self.deck.lock().anchor.is_some()
    }

    pub fn may_control(&self) -> bool {
        *self.may_control.lock()
    }

    // Same effects as the Player impl, used for "user" actions in the scenario

    pub fn user_play(&self) {
        let mut deck = self.deck.lock();
        if deck.anchor.is_none() {
            deck.anchor = Some(Instant::now());
        }
    }

    pub fn user_pause(&self) {
        let mut deck = self.deck.lock();
        deck.position = deck.now();
        deck.anchor = None;
    }

    pub fn user_seek(&self, secs: f64) {
        let mut deck = self.deck.lock();
        deck.position = secs;
        if deck.anchor.is_some() {
            deck.anchor = Some(Instant::now());
        }
    }
}

impl Player for SimPlayer {
    fn current_time(&self) -> f64 {
        self.position()
    }

    fn set_current_time(&mut self, secs: f64) {
        self.user_seek(secs);
    }

    fn play(&mut self) {
        self.user_play();
    }

    fn pause(&mut self) {
        self.user_pause();
    }

    fn is_paused(&self) -> bool {
        !self.playing()
    }

    fn control_permission_changed(&mut self, may_control: bool) {
        *self.may_control.lock() = may_control;
    }
}
