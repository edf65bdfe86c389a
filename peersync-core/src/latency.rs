//! Connection test latency tracking
//!
//! A peer probes the party with a connection test; whoever answers lets us
//! measure the round-trip time to them and rate the link.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Number of RTT samples to keep for averaging
const RTT_SAMPLE_COUNT: usize = 5;

/// Probes older than this are forgotten
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Rough link rating derived from RTT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl LinkQuality {
    pub fn from_rtt_ms(rtt_ms: u64) -> Self {
        match rtt_ms {
            0..=200 => LinkQuality::Excellent,
            201..=500 => LinkQuality::Good,
            501..=1000 => LinkQuality::Fair,
            _ => LinkQuality::Poor,
        }
    }
}

impl fmt::Display for LinkQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LinkQuality::Excellent => "Excellent",
            LinkQuality::Good => "Good",
            LinkQuality::Fair => "Fair",
            LinkQuality::Poor => "Poor",
        };
        f.write_str(label)
    }
}

/// Result of one answered probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyReport {
    pub rtt_ms: u64,
    pub avg_rtt_ms: u64,
    pub quality: LinkQuality,
}

/// RTT history for a single peer
struct PeerLatency {
    samples: Vec<u64>,
    avg_rtt_ms: u64,
}

impl PeerLatency {
    fn new() -> Self {
        Self {
            samples: Vec::with_capacity(RTT_SAMPLE_COUNT),
            avg_rtt_ms: 0,
        }
    }

    fn add_sample(&mut self, rtt_ms: u64) {
        if self.samples.len() >= RTT_SAMPLE_COUNT {
            self.samples.remove(0);
        }
        self.samples.push(rtt_ms);
        let sum: u64 = self.samples.iter().sum();
        self.avg_rtt_ms = sum / self.samples.len() as u64;
    }
}

/// A broadcast probe; every peer may answer it once
struct Probe {
    sent_at: Instant,
    answered: HashSet<String>,
}

/// Tracks outstanding probes and per-peer RTT
#[derive(Default)]
pub struct LatencyTracker {
    /// Pending probes keyed by the timestamp we sent
    pending: HashMap<u64, Probe>,
    peers: HashMap<String, PeerLatency>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new probe. Returns the timestamp to put on the wire.
    pub fn create_probe(&mut self) -> u64 {
        let now = Instant::now();
        let mut timestamp_ms = current_time_ms();
        // Two probes in the same millisecond must stay distinguishable
        while self.pending.contains_key(&timestamp_ms) {
            timestamp_ms += 1;
        }
        self.pending.insert(
            timestamp_ms,
            Probe {
                sent_at: now,
                answered: HashSet::new(),
            },
        );
        self.pending
            .retain(|_, probe| probe.sent_at.elapsed() < PROBE_TIMEOUT);
        timestamp_ms
    }

    /// Handle a probe answer. Returns `None` if the probe isn't ours, has
    /// expired, or `from_peer` already answered it.
    pub fn handle_response(&mut self, from_peer: &str, original_timestamp_ms: u64) -> Option<LatencyReport> {
        let probe = self.pending.get_mut(&original_timestamp_ms)?;
        if probe.sent_at.elapsed() >= PROBE_TIMEOUT {
            self.pending.remove(&original_timestamp_ms);
            return None;
        }
        if !probe.answered.insert(from_peer.to_string()) {
            return None;
        }
        let rtt_ms = probe.sent_at.elapsed().as_millis() as u64;

        let peer = self
            .peers
            .entry(from_peer.to_string())
            .or_insert_with(PeerLatency::new);
        peer.add_sample(rtt_ms);

        tracing::debug!(
            "Latency to {}: RTT={}ms, avg={}ms",
            from_peer,
            rtt_ms,
            peer.avg_rtt_ms
        );

        Some(LatencyReport {
            rtt_ms,
            avg_rtt_ms: peer.avg_rtt_ms,
            quality: LinkQuality::from_rtt_ms(rtt_ms),
        })
    }

    /// Average RTT to a peer, if we ever measured it
    pub fn average_rtt_ms(&self, peer_id: &str) -> Option<u64> {
        self.peers.get(peer_id).map(|p| p.avg_rtt_ms)
    }

    /// Clear all state (when leaving the party)
    pub fn clear(&mut self) {
        self.pending.clear();
        self.peers.clear();
    }
}

/// Current time in milliseconds since UNIX epoch
pub fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
