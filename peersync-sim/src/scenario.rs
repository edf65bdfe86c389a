//! Scripted watch party run against in-process peers

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{info, warn};

use peersync_core::{
    DriverHandle, MemoryNetwork, Notice, PartySnapshot, PlaybackEvent, Role, SessionCallback,
    SessionConfig, SessionDriver,
};

use crate::player::SimPlayer;

/// Knobs from the command line
#[derive(Debug, Clone)]
pub struct Options {
    pub peers: usize,
    /// How long the party plays before the drift check gets a chance
    pub drift_secs: u64,
}

/// Logs everything a peer's session reports
struct LogCallback {
    peer_id: String,
}

impl SessionCallback for LogCallback {
    fn on_role_changed(&self, role: Role) {
        info!("[{}] role -> {:?}", self.peer_id, role);
    }

    fn on_roster_changed(&self, snapshot: &PartySnapshot) {
        let members: Vec<String> = snapshot
            .members
            .iter()
            .map(|m| {
                let mark = if m.is_host {
                    "*"
                } else if m.can_control {
                    "+"
                } else {
                    ""
                };
                format!("{}{}", m.nickname, mark)
            })
            .collect();
        info!("[{}] roster: {}", self.peer_id, members.join(", "));
    }

    fn on_notice(&self, notice: Notice) {
        info!("[{}] {}", self.peer_id, notice);
    }

    fn on_chat(&self, _from: &str, sender_name: &str, message: &str) {
        info!("[{}] <{}> {}", self.peer_id, sender_name, message);
    }

    fn on_passthrough(&self, from: &str, kind: &str, payload: &Value) {
        info!("[{}] {} from {}: {}", self.peer_id, kind, from, payload);
    }

    fn on_party_ended(&self, reason: &str) {
        warn!("[{}] party ended: {}", self.peer_id, reason);
    }
}

struct SimPeer {
    id: String,
    driver: DriverHandle,
    player: SimPlayer,
}

impl SimPeer {
    fn spawn(runtime: &Handle, net: &MemoryNetwork, id: String) -> Self {
        let (transport, events) = net.register(id.as_str());
        let player = SimPlayer::new();
        let config = SessionConfig::default()
            .with_nickname(id.to_uppercase())
            .with_sync_check_interval(Duration::from_secs(1));

        let driver = SessionDriver::spawn(
            runtime,
            config,
            Box::new(transport),
            Box::new(player.clone()),
            Some(Arc::new(LogCallback {
                peer_id: id.clone(),
            })),
        );
        driver.forward_transport_events(runtime, events);

        Self { id, driver, player }
    }

    /// What a user pressing play does: the player moves first, then the session hears about it
    fn press_play(&self) -> Result<(), Box<dyn Error>> {
        if !self.player.may_control() {
            info!("[{}] controls are locked, the party will not follow", self.id);
        }
        self.player.user_play();
        self.driver.local_event(PlaybackEvent::Play)?;
        Ok(())
    }

    fn press_pause(&self) -> Result<(), Box<dyn Error>> {
        self.player.user_pause();
        self.driver.local_event(PlaybackEvent::Pause)?;
        Ok(())
    }

    fn scrub_to(&self, secs: f64) -> Result<(), Box<dyn Error>> {
        self.player.user_seek(secs);
        self.driver.local_event(PlaybackEvent::Seeked)?;
        Ok(())
    }
}

async fn settle(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

/// Print where every live peer stands
async fn report(stage: &str, peers: &[SimPeer]) {
    let snapshots = join_all(peers.iter().map(|p| p.driver.snapshot())).await;

    info!("=== {} ===", stage);
    for (peer, snapshot) in peers.iter().zip(snapshots) {
        match snapshot {
            Ok(s) => info!(
                "{:>8} {:?} {:>8.2}s {} (rate {:.3}, control {})",
                peer.id,
                s.role,
                peer.player.position(),
                if peer.player.playing() { "playing" } else { "paused" },
                peer.player.rate(),
                s.can_control,
            ),
            Err(e) => info!("{:>8} gone ({})", peer.id, e),
        }
    }
}

pub async fn run(options: Options) -> Result<(), Box<dyn Error>> {
    let runtime = Handle::current();
    let net = MemoryNetwork::new();

    let mut peers: Vec<SimPeer> = (0..options.peers)
        .map(|i| SimPeer::spawn(&runtime, &net, format!("peer-{}", i)))
        .collect();

    // Host and joins
    let code = peers[0].driver.create_party(&peers[0].id).await?;
    info!("Party code: {}", code);
    for guest in &peers[1..] {
        guest.driver.join_party(&guest.id, code.as_str()).await?;
    }
    settle(2).await;
    report("everyone joined", &peers).await;

    // Host starts the video
    peers[0].scrub_to(42.0)?;
    peers[0].press_play()?;
    settle(1).await;
    report("host pressed play", &peers).await;

    // A guest without permission tries to pause
    peers[1].press_pause()?;
    settle(1).await;
    report("guest pause without permission", &peers).await;

    // Grant it and try again
    peers[0].driver.set_member_control(&peers[1].id, true).await?;
    settle(1).await;
    peers[1].press_play()?;
    peers[1].press_pause()?;
    settle(1).await;
    report("permitted guest paused", &peers).await;

    peers[1].press_play()?;
    peers[1].driver.send_chat("drift test starting").await?;
    info!("Letting the party play for {}s", options.drift_secs);
    settle(options.drift_secs).await;
    report("after drifting", &peers).await;

    peers[0].driver.test_connection().await?;
    settle(1).await;

    // Shells keep channels between guests so the party survives the host
    for (i, a) in peers.iter().enumerate().skip(1) {
        for b in peers.iter().skip(i + 1) {
            net.link(&a.id, &b.id)?;
        }
    }

    let host = peers.remove(0);
    info!("Dropping host {}", host.id);
    net.drop_peer(&host.id);
    host.driver.shutdown();
    settle(1).await;
    report("host gone", &peers).await;

    if let Some(new_host) = peers.first() {
        new_host.press_pause()?;
        settle(1).await;
        report("new host paused", &peers).await;
    }

    for peer in &peers {
        peer.driver.shutdown();
    }
    settle(1).await;
    Ok(())
}
