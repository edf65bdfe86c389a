use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use super::*;
use crate::sync::{Member, RosterUpdate};

#[derive(Default)]
struct Wire {
    sent: Vec<Message>,
    connects: Vec<String>,
    closed: usize,
    fail_connect: bool,
}

struct MockTransport(Arc<Mutex<Wire>>);

impl Transport for MockTransport {
    fn connect(&mut self, target: &str) -> Result<(), TransportError> {
        let mut wire = self.0.lock();
        wire.connects.push(target.to_string());
        if wire.fail_connect {
            return Err(TransportError::PeerUnavailable(target.to_string()));
        }
        Ok(())
    }

    fn broadcast(&mut self, payload: &str) -> Result<(), TransportError> {
        self.0.lock().sent.push(Message::decode(payload).unwrap());
        Ok(())
    }

    fn close_all(&mut self) {
        self.0.lock().closed += 1;
    }
}

#[derive(Default)]
struct Playback {
    time: f64,
    playing: bool,
    permission: Vec<bool>,
}

struct MockPlayer(Arc<Mutex<Playback>>);

impl Player for MockPlayer {
    fn current_time(&self) -> f64 {
        self.0.lock().time
    }

    fn set_current_time(&mut self, secs: f64) {
        self.0.lock().time = secs;
    }

    fn play(&mut self) {
        self.0.lock().playing = true;
    }

    fn pause(&mut self) {
        self.0.lock().playing = false;
    }

    fn is_paused(&self) -> bool {
        !self.0.lock().playing
    }

    fn control_permission_changed(&mut self, may_control: bool) {
        self.0.lock().permission.push(may_control);
    }
}

#[derive(Default)]
struct Timers {
    sync_checks: Option<Duration>,
    deferred: Vec<(Duration, DeferredTask)>,
}

struct MockScheduler(Arc<Mutex<Timers>>);

impl Scheduler for MockScheduler {
    fn start_sync_checks(&mut self, every: Duration) {
        self.0.lock().sync_checks = Some(every);
    }

    fn stop_sync_checks(&mut self) {
        self.0.lock().sync_checks = None;
    }

    fn defer(&mut self, delay: Duration, task: DeferredTask) {
        self.0.lock().deferred.push((delay, task));
    }

    fn cancel_deferred(&mut self) {
        self.0.lock().deferred.clear();
    }
}

#[derive(Default)]
struct Recorder {
    notices: Mutex<Vec<Notice>>,
    roles: Mutex<Vec<Role>>,
    chats: Mutex<Vec<(String, String)>>,
    passthrough: Mutex<Vec<(String, Value)>>,
    ended: Mutex<Vec<String>>,
}

impl SessionCallback for Recorder {
    fn on_role_changed(&self, role: Role) {
        self.roles.lock().push(role);
    }

    fn on_roster_changed(&self, _snapshot: &PartySnapshot) {}

    fn on_notice(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }

    fn on_chat(&self, _from: &str, sender_name: &str, message: &str) {
        self.chats
            .lock()
            .push((sender_name.to_string(), message.to_string()));
    }

    fn on_passthrough(&self, _from: &str, kind: &str, payload: &Value) {
        self.passthrough
            .lock()
            .push((kind.to_string(), payload.clone()));
    }

    fn on_party_ended(&self, reason: &str) {
        self.ended.lock().push(reason.to_string());
    }
}

const WINDOW: Duration = Duration::from_millis(40);

struct Harness {
    session: Session,
    wire: Arc<Mutex<Wire>>,
    playback: Arc<Mutex<Playback>>,
    timers: Arc<Mutex<Timers>>,
    events: Arc<Recorder>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(
            SessionConfig::default()
                .with_nickname("Me")
                .with_reentrancy_window(WINDOW),
        )
    }

    fn with_config(config: SessionConfig) -> Self {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let playback = Arc::new(Mutex::new(Playback::default()));
        let timers = Arc::new(Mutex::new(Timers::default()));
        let events = Arc::new(Recorder::default());

        let mut session = Session::new(
            config,
            Box::new(MockTransport(wire.clone())),
            Box::new(MockPlayer(playback.clone())),
            Box::new(MockScheduler(timers.clone())),
        );
        session.set_callback(events.clone());

        Self {
            session,
            wire,
            playback,
            timers,
            events,
        }
    }

    /// Host "h" with participant "b" registered
    fn hosting_with_member() -> Self {
        let mut h = Self::new();
        h.session.create_party("h").unwrap();
        h.session
            .handle_transport_event(TransportEvent::Open { peer_id: "b".into() });
        h.deliver("b", Message::UserInfo {
            nickname: "Bob".into(),
        });
        h.take_sent();
        h
    }

    /// Participant `local` joined to host "a", with the given roster
    fn joined(local: &str, roster: &[(&str, bool)]) -> Self {
        let mut h = Self::new();
        h.session.join_party(local, "a").unwrap();
        h.session
            .handle_transport_event(TransportEvent::Open { peer_id: "a".into() });
        h.deliver("a", roster_msg(roster, "a"));
        h.take_sent();
        h
    }

    fn deliver(&mut self, from: &str, msg: Message) {
        self.session.handle_transport_event(TransportEvent::Data {
            from: from.into(),
            payload: msg.encode().unwrap(),
        });
    }

    fn take_sent(&self) -> Vec<Message> {
        std::mem::take(&mut self.wire.lock().sent)
    }

    fn set_playback(&self, time: f64, playing: bool) {
        let mut p = self.playback.lock();
        p.time = time;
        p.playing = playing;
    }

    fn time(&self) -> f64 {
        self.playback.lock().time
    }

    fn playing(&self) -> bool {
        self.playback.lock().playing
    }

    fn notices(&self) -> Vec<Notice> {
        self.events.notices.lock().clone()
    }
}

fn roster_msg(entries: &[(&str, bool)], host: &str) -> Message {
    Message::RosterUpdate(RosterUpdate {
        list: entries
            .iter()
            .map(|(id, can_control)| {
                (
                    id.to_string(),
                    Member {
                        nickname: id.to_uppercase(),
                        can_control: *can_control,
                    },
                )
            })
            .collect(),
        host_id: host.into(),
    })
}

/// Peer ids with their permission, plus the host id, of a roster broadcast
fn roster_summary(msg: &Message) -> (Vec<(String, bool)>, String) {
    match msg {
        Message::RosterUpdate(update) => (
            update
                .list
                .iter()
                .map(|(id, m)| (id.clone(), m.can_control))
                .collect(),
            update.host_id.clone(),
        ),
        other => panic!("expected a roster, got {:?}", other),
    }
}

fn summary(entries: &[(&str, bool)], host: &str) -> (Vec<(String, bool)>, String) {
    (
        entries.iter().map(|(id, c)| (id.to_string(), *c)).collect(),
        host.to_string(),
    )
}

fn request(action: ControlAction, time: Option<f64>, is_playing: Option<bool>) -> Message {
    Message::ControlRequest(ControlRequest {
        action,
        time,
        is_playing,
    })
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_create_and_leave_party() {
    let mut h = Harness::new();
    let code = h.session.create_party("host-peer-123456").unwrap();
    assert_eq!(code.short(), "...123456");
    assert_eq!(h.session.role(), Role::Hosting);
    assert!(h.session.may_control());
    assert_eq!(h.session.create_party("x"), Err(SessionError::AlreadyInParty));

    h.session.leave_party().unwrap();
    assert_eq!(h.session.role(), Role::Unattached);
    assert_eq!(h.wire.lock().closed, 1);
    assert_eq!(h.session.leave_party(), Err(SessionError::NotInParty));
}

#[test]
fn test_join_handshake() {
    let mut h = Harness::new();
    h.session.join_party("b", "  a ").unwrap();
    assert_eq!(h.session.role(), Role::Joining);
    assert_eq!(h.wire.lock().connects, ["a"]);
    assert!(!h.session.may_control());
    assert_eq!(h.playback.lock().permission, [false]);

    h.session
        .handle_transport_event(TransportEvent::Open { peer_id: "a".into() });
    assert_eq!(h.session.role(), Role::Joined);
    assert_eq!(
        h.take_sent(),
        [Message::UserInfo {
            nickname: "Me".into()
        }]
    );

    {
        let timers = h.timers.lock();
        assert_eq!(timers.sync_checks, Some(Duration::from_secs(2)));
        assert_eq!(
            timers.deferred,
            [(Duration::from_millis(500), DeferredTask::RequestSync)]
        );
    }

    h.session.on_deferred(DeferredTask::RequestSync);
    assert_eq!(h.take_sent(), [Message::RequestSync]);
    assert!(h.notices().contains(&Notice::Connected));
}

#[test]
fn test_join_rejects_bad_codes() {
    let mut h = Harness::new();
    assert!(matches!(
        h.session.join_party("b", "   "),
        Err(SessionError::InvalidPartyCode(_))
    ));
    assert!(matches!(
        h.session.join_party("b", "b"),
        Err(SessionError::InvalidPartyCode(_))
    ));
    assert_eq!(h.session.role(), Role::Unattached);
}

#[test]
fn test_join_unreachable_host_resets() {
    let mut h = Harness::new();
    h.wire.lock().fail_connect = true;
    assert!(matches!(
        h.session.join_party("b", "a"),
        Err(SessionError::Transport(_))
    ));
    assert_eq!(h.session.role(), Role::Unattached);
    assert!(h.session.may_control());
}

#[test]
fn test_messages_outside_party_are_dropped() {
    let mut h = Harness::new();
    let result = h
        .session
        .handle_message("a", Message::ControlCommand(ControlCommand::new(ControlAction::Play)));
    assert!(matches!(result, Err(DispatchError::StateInconsistency(_))));
    assert!(!h.playing());
}

// ============================================================================
// Host routing
// ============================================================================

#[test]
fn test_host_registers_member_and_welcomes() {
    let mut h = Harness::new();
    h.session.create_party("h").unwrap();
    h.session
        .handle_transport_event(TransportEvent::Open { peer_id: "b".into() });
    assert_eq!(
        h.timers.lock().deferred,
        [(
            Duration::from_secs(1),
            DeferredTask::WelcomeSync { peer_id: "b".into() }
        )]
    );

    h.deliver("b", Message::UserInfo {
        nickname: "Bob".into(),
    });
    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(roster_summary(&sent[0]), summary(&[("h", true), ("b", false)], "h"));
    assert!(h.notices().contains(&Notice::PeerJoined {
        peer_id: "b".into(),
        nickname: "Bob".into()
    }));

    h.set_playback(12.0, true);
    h.session
        .on_deferred(DeferredTask::WelcomeSync { peer_id: "b".into() });
    let sent = h.take_sent();
    assert_eq!(sent[0], Message::ControlCommand(ControlCommand::sync(12.0, true)));
    assert!(matches!(sent[1], Message::RosterUpdate(_)));
}

#[test]
fn test_rename_keeps_permission() {
    let mut h = Harness::hosting_with_member();
    h.session.set_member_control("b", true).unwrap();
    h.deliver("b", Message::UserInfo {
        nickname: "Bobby".into(),
    });

    let member = h.session.party().roster.get("b").unwrap();
    assert_eq!(member.nickname, "Bobby");
    assert!(member.can_control);
}

#[test]
fn test_request_without_permission_is_rejected() {
    let mut h = Harness::hosting_with_member();
    let result = h
        .session
        .handle_message("b", request(ControlAction::Play, None, None));
    assert!(matches!(result, Err(DispatchError::AuthorityViolation { .. })));
    assert!(!h.playing());
    assert!(h.take_sent().is_empty());
}

#[test]
fn test_permitted_request_is_relayed_once() {
    let mut h = Harness::hosting_with_member();
    h.session.set_member_control("b", true).unwrap();
    h.take_sent();

    h.deliver("b", request(ControlAction::Seek, Some(42.0), Some(true)));
    assert_eq!(h.time(), 42.0);
    assert!(h.playing());

    // The player reports the seek back; it must not produce a second command
    h.session.handle_local_event(PlaybackEvent::Seeked);
    h.session.handle_local_event(PlaybackEvent::Play);

    assert_eq!(
        h.take_sent(),
        [Message::ControlCommand(ControlCommand::seek(42.0, true))]
    );
}

#[test]
fn test_seek_request_relays_resulting_play_state() {
    let mut h = Harness::hosting_with_member();
    h.session.set_member_control("b", true).unwrap();
    h.set_playback(5.0, true);
    h.take_sent();

    // No play state in the request: the host keeps playing and says so
    h.deliver("b", request(ControlAction::Seek, Some(12.0), None));
    assert_eq!(h.time(), 12.0);
    assert!(h.playing());
    assert_eq!(
        h.take_sent(),
        [Message::ControlCommand(ControlCommand::seek(12.0, true))]
    );

    h.set_playback(12.0, false);
    h.deliver("b", request(ControlAction::Seek, Some(20.0), None));
    assert_eq!(
        h.take_sent(),
        [Message::ControlCommand(ControlCommand::seek(20.0, false))]
    );
}

#[test]
fn test_request_cannot_carry_sync() {
    let mut h = Harness::hosting_with_member();
    h.session.set_member_control("b", true).unwrap();
    h.take_sent();

    let result = h
        .session
        .handle_message("b", request(ControlAction::Sync, Some(1.0), None));
    assert!(matches!(
        result,
        Err(DispatchError::Protocol(ProtocolError::InvalidAction { .. }))
    ));
    let result = h
        .session
        .handle_message("b", request(ControlAction::Seek, None, None));
    assert!(matches!(
        result,
        Err(DispatchError::Protocol(ProtocolError::MissingField { .. }))
    ));
    assert!(h.take_sent().is_empty());
}

#[test]
fn test_host_local_events_broadcast_commands() {
    let mut h = Harness::hosting_with_member();
    h.set_playback(30.0, true);

    h.session.handle_local_event(PlaybackEvent::Pause);
    h.session.handle_local_event(PlaybackEvent::Seeked);
    assert_eq!(
        h.take_sent(),
        [
            Message::ControlCommand(ControlCommand::new(ControlAction::Pause)),
            Message::ControlCommand(ControlCommand::seek(30.0, true)),
        ]
    );
}

#[test]
fn test_host_ignores_commands_from_others() {
    let mut h = Harness::hosting_with_member();
    let result = h
        .session
        .handle_message("b", Message::ControlCommand(ControlCommand::new(ControlAction::Play)));
    assert!(matches!(result, Err(DispatchError::AuthorityViolation { .. })));
    assert!(!h.playing());
}

// ============================================================================
// Drift correction
// ============================================================================

#[test]
fn test_sync_check_within_tolerance() {
    let mut h = Harness::hosting_with_member();
    h.set_playback(50.0, true);
    h.deliver("b", Message::SyncCheck { current_time: 50.4 });
    assert!(h.playing());
    assert!(h.take_sent().is_empty());
}

#[test]
fn test_sync_check_drift_pauses_everyone() {
    let mut h = Harness::hosting_with_member();
    h.set_playback(50.0, true);
    h.deliver("b", Message::SyncCheck { current_time: 48.0 });

    assert!(!h.playing());
    assert_eq!(
        h.take_sent(),
        [Message::ControlCommand(ControlCommand::sync_issue_pause(50.0))]
    );

    // A second report in the same cycle finds the host paused already
    h.deliver("b", Message::SyncCheck { current_time: 47.0 });
    assert!(h.take_sent().is_empty());
}

#[test]
fn test_sync_check_ignored_by_participant() {
    let mut h = Harness::joined("b", &[("a", true), ("b", false)]);
    h.set_playback(10.0, true);
    let result = h
        .session
        .handle_message("c", Message::SyncCheck { current_time: 0.0 });
    assert!(matches!(result, Err(DispatchError::AuthorityViolation { .. })));
    assert!(h.playing());
    assert!(h.take_sent().is_empty());
}

#[test]
fn test_sync_small_drift_keeps_position() {
    let mut h = Harness::joined("b", &[("a", true), ("b", false)]);
    h.set_playback(10.6, false);
    h.deliver("a", Message::ControlCommand(ControlCommand::sync(10.2, true)));
    assert_eq!(h.time(), 10.6);
    assert!(h.playing());
}

#[test]
fn test_sync_large_drift_seeks() {
    let mut h = Harness::joined("b", &[("a", true), ("b", false)]);
    h.set_playback(48.0, true);
    h.deliver("a", Message::ControlCommand(ControlCommand::sync(50.0, true)));
    assert_eq!(h.time(), 50.0);
    assert!(h.playing());
    assert!(h.take_sent().is_empty());
}

#[test]
fn test_sync_issue_pause_aligns_participant() {
    let mut h = Harness::joined("b", &[("a", true), ("b", false)]);
    h.set_playback(48.0, true);
    h.deliver(
        "a",
        Message::ControlCommand(ControlCommand::sync_issue_pause(50.0)),
    );
    assert!(!h.playing());
    assert_eq!(h.time(), 50.0);
    assert!(h
        .notices()
        .contains(&Notice::SyncIssuePause { host_time: 50.0 }));
}

#[test]
fn test_sync_check_tick() {
    let mut h = Harness::joined("b", &[("a", true), ("b", false)]);

    h.set_playback(5.0, false);
    h.session.on_sync_check_tick();
    assert!(h.take_sent().is_empty());

    h.set_playback(5.0, true);
    h.session.on_sync_check_tick();
    assert_eq!(h.take_sent(), [Message::SyncCheck { current_time: 5.0 }]);

    // Suppressed right after applying a host command
    h.deliver("a", Message::ControlCommand(ControlCommand::new(ControlAction::Play)));
    h.session.on_sync_check_tick();
    assert!(h.take_sent().is_empty());
}

// ============================================================================
// Participant control
// ============================================================================

#[test]
fn test_command_from_non_host_is_ignored() {
    let mut h = Harness::joined("b", &[("a", true), ("b", false), ("c", false)]);
    let result = h
        .session
        .handle_message("c", Message::ControlCommand(ControlCommand::new(ControlAction::Play)));
    assert!(matches!(result, Err(DispatchError::AuthorityViolation { .. })));
    assert!(!h.playing());
}

#[test]
fn test_commands_apply_without_echo() {
    let mut h = Harness::joined("b", &[("a", true), ("b", true)]);
    h.deliver("a", Message::ControlCommand(ControlCommand::new(ControlAction::Play)));
    assert!(h.playing());

    // The player's own play event is swallowed by the guard
    h.session.handle_local_event(PlaybackEvent::Play);
    assert!(h.take_sent().is_empty());

    thread::sleep(WINDOW * 2);
    h.session.handle_local_event(PlaybackEvent::Pause);
    assert_eq!(
        h.take_sent(),
        [request(ControlAction::Pause, None, None)]
    );
}

#[test]
fn test_replayed_commands_are_idempotent() {
    let mut h = Harness::joined("b", &[("a", true), ("b", false)]);
    h.set_playback(3.0, false);

    let seek = Message::ControlCommand(ControlCommand::seek(33.0, true));
    h.deliver("a", seek.clone());
    let once = (h.time(), h.playing());
    h.deliver("a", seek);
    assert_eq!(once, (33.0, true));
    assert_eq!((h.time(), h.playing()), once);

    let sync = Message::ControlCommand(ControlCommand::sync(50.0, false));
    h.deliver("a", sync.clone());
    let once = (h.time(), h.playing());
    h.deliver("a", sync);
    assert_eq!(once, (50.0, false));
    assert_eq!((h.time(), h.playing()), once);
}

#[test]
fn test_local_event_without_permission_is_denied_once() {
    let mut h = Harness::joined("b", &[("a", true), ("b", false)]);
    h.session.handle_local_event(PlaybackEvent::Play);
    h.session.handle_local_event(PlaybackEvent::Seeked);

    assert!(h.take_sent().is_empty());
    let denied = h
        .notices()
        .iter()
        .filter(|n| **n == Notice::ControlDenied)
        .count();
    assert_eq!(denied, 1);
}

#[test]
fn test_permitted_seek_becomes_request() {
    let mut h = Harness::joined("b", &[("a", true), ("b", true)]);
    h.set_playback(75.5, false);
    h.session.handle_local_event(PlaybackEvent::Seeked);
    assert_eq!(
        h.take_sent(),
        [request(ControlAction::Seek, Some(75.5), Some(false))]
    );
}

#[test]
fn test_roster_drives_own_permission() {
    let mut h = Harness::joined("b", &[("a", true), ("b", false)]);
    assert!(!h.session.may_control());

    h.deliver("a", roster_msg(&[("a", true), ("b", true)], "a"));
    assert!(h.session.may_control());
    assert_eq!(h.playback.lock().permission.last(), Some(&true));
    assert!(h.notices().contains(&Notice::PermissionGranted));

    // Applying the same roster twice changes nothing
    let before = h.notices().len();
    h.deliver("a", roster_msg(&[("a", true), ("b", true)], "a"));
    assert_eq!(h.notices().len(), before);

    h.deliver("a", roster_msg(&[("a", true), ("b", false)], "a"));
    assert!(!h.session.may_control());
    assert!(h.notices().contains(&Notice::PermissionRevoked));
}

#[test]
fn test_roster_from_non_host_is_ignored() {
    let mut h = Harness::joined("b", &[("a", true), ("b", false), ("c", false)]);
    let result = h
        .session
        .handle_message("c", roster_msg(&[("c", true), ("b", true)], "c"));
    assert!(matches!(result, Err(DispatchError::AuthorityViolation { .. })));
    assert!(!h.session.may_control());
    assert_eq!(h.session.party().host_peer_id.as_deref(), Some("a"));
}

// ============================================================================
// Permissions
// ============================================================================

#[test]
fn test_permission_errors() {
    let mut h = Harness::hosting_with_member();
    assert_eq!(
        h.session.set_member_control("h", false),
        Err(SessionError::HostPermissionFixed)
    );
    assert_eq!(
        h.session.set_member_control("zed", true),
        Err(SessionError::UnknownMember("zed".into()))
    );

    let mut p = Harness::joined("b", &[("a", true), ("b", false)]);
    assert_eq!(p.session.toggle_member_control("a"), Err(SessionError::NotHost));

    let mut idle = Harness::new();
    assert_eq!(
        idle.session.set_member_control("b", true),
        Err(SessionError::NotInParty)
    );
}

#[test]
fn test_toggle_broadcasts_roster() {
    let mut h = Harness::hosting_with_member();
    assert_eq!(h.session.toggle_member_control("b"), Ok(true));
    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(roster_summary(&sent[0]), summary(&[("h", true), ("b", true)], "h"));

    assert_eq!(h.session.toggle_member_control("b"), Ok(false));
    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(roster_summary(&sent[0]), summary(&[("h", true), ("b", false)], "h"));
}

// ============================================================================
// Departures and migration
// ============================================================================

#[test]
fn test_host_drops_departed_member() {
    let mut h = Harness::hosting_with_member();
    h.session
        .handle_transport_event(TransportEvent::Close { peer_id: "b".into() });
    assert_eq!(h.session.party().roster.len(), 1);
    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(roster_summary(&sent[0]), summary(&[("h", true)], "h"));
}

#[test]
fn test_successor_promotes_itself() {
    let mut h = Harness::joined("b", &[("a", true), ("b", false), ("c", false)]);
    h.session
        .handle_transport_event(TransportEvent::Close { peer_id: "a".into() });

    assert_eq!(h.session.role(), Role::Hosting);
    assert!(h.session.may_control());
    assert_eq!(h.timers.lock().sync_checks, None);
    assert_eq!(
        h.take_sent(),
        [roster_msg(&[("b", true), ("c", false)], "b")]
    );
    assert!(h.notices().contains(&Notice::PromotedToHost));
}

#[test]
fn test_non_successor_follows_new_host() {
    let mut h = Harness::joined("c", &[("a", true), ("b", false), ("c", false)]);
    h.session
        .handle_transport_event(TransportEvent::Close { peer_id: "a".into() });

    assert_eq!(h.session.role(), Role::Joined);
    assert_eq!(h.session.party().host_peer_id.as_deref(), Some("b"));
    assert!(h.notices().contains(&Notice::HostMigrated {
        peer_id: "b".into(),
        nickname: "B".into()
    }));

    // The new host's roster and commands are accepted
    h.deliver("b", roster_msg(&[("b", true), ("c", true)], "b"));
    assert!(h.session.may_control());
    h.deliver("b", Message::ControlCommand(ControlCommand::new(ControlAction::Play)));
    assert!(h.playing());
}

#[test]
fn test_successor_roster_arrives_before_host_close() {
    let mut h = Harness::joined("c", &[("a", true), ("b", false), ("c", false)]);

    // b noticed a leaving first and already published its roster
    h.deliver("b", roster_msg(&[("b", true), ("c", true)], "b"));
    assert_eq!(h.session.party().host_peer_id.as_deref(), Some("b"));
    assert!(h.session.may_control());
    assert_eq!(
        h.session.party().roster.peer_ids().cloned().collect::<Vec<_>>(),
        ["b", "c"]
    );
    assert!(h.notices().contains(&Notice::HostMigrated {
        peer_id: "b".into(),
        nickname: "B".into()
    }));

    // The late close of the old host changes nothing
    h.session
        .handle_transport_event(TransportEvent::Close { peer_id: "a".into() });
    assert_eq!(h.session.role(), Role::Joined);
    assert_eq!(h.session.party().host_peer_id.as_deref(), Some("b"));
    assert!(h.session.may_control());

    h.deliver("b", Message::ControlCommand(ControlCommand::new(ControlAction::Play)));
    assert!(h.playing());
}

#[test]
fn test_roster_from_non_successor_is_still_rejected() {
    let mut h = Harness::joined("c", &[("a", true), ("b", false), ("c", false), ("d", false)]);
    let result = h
        .session
        .handle_message("d", roster_msg(&[("d", true), ("c", true)], "d"));
    assert!(matches!(result, Err(DispatchError::AuthorityViolation { .. })));
    assert_eq!(h.session.party().host_peer_id.as_deref(), Some("a"));
}

#[test]
fn test_host_lost_without_successor_ends_party() {
    let mut h = Harness::joined("b", &[("a", true)]);
    h.session
        .handle_transport_event(TransportEvent::Close { peer_id: "a".into() });
    assert_eq!(h.session.role(), Role::Unattached);
    assert_eq!(h.events.ended.lock().len(), 1);
}

#[test]
fn test_fatal_error_reconnects() {
    let mut h = Harness::joined("b", &[("a", true), ("b", true)]);
    h.session.handle_transport_event(TransportEvent::Error {
        peer_id: None,
        message: "network changed".into(),
        fatal: true,
    });
    assert_eq!(h.session.role(), Role::Disconnected);
    assert!(!h.session.may_control());
    assert_eq!(
        h.timers.lock().deferred.last(),
        Some(&(Duration::from_secs(2), DeferredTask::Reconnect))
    );

    h.session.on_deferred(DeferredTask::Reconnect);
    assert_eq!(h.session.role(), Role::Joining);
    assert_eq!(h.wire.lock().connects, ["a", "a"]);

    h.session
        .handle_transport_event(TransportEvent::Open { peer_id: "a".into() });
    assert_eq!(h.session.role(), Role::Joined);
}

#[test]
fn test_fatal_error_while_reconnecting_ends_party() {
    let mut h = Harness::joined("b", &[("a", true), ("b", true)]);
    let fatal = || TransportEvent::Error {
        peer_id: None,
        message: "network changed".into(),
        fatal: true,
    };
    h.session.handle_transport_event(fatal());
    assert_eq!(h.session.role(), Role::Disconnected);

    h.session.handle_transport_event(fatal());
    assert_eq!(h.session.role(), Role::Unattached);
    assert_eq!(h.events.ended.lock().len(), 1);
    assert!(h.timers.lock().deferred.is_empty());
}

#[test]
fn test_leaving_drops_pending_reconnect() {
    let mut h = Harness::joined("b", &[("a", true), ("b", true)]);
    h.session.handle_transport_event(TransportEvent::Error {
        peer_id: None,
        message: "network changed".into(),
        fatal: true,
    });
    assert!(h
        .timers
        .lock()
        .deferred
        .iter()
        .any(|(_, task)| *task == DeferredTask::Reconnect));

    h.session.leave_party().unwrap();
    assert!(h.timers.lock().deferred.is_empty());

    // A new party starts with a full reconnect budget
    h.session.join_party("b", "a").unwrap();
    h.session
        .handle_transport_event(TransportEvent::Open { peer_id: "a".into() });
    h.session.handle_transport_event(TransportEvent::Error {
        peer_id: None,
        message: "network changed".into(),
        fatal: true,
    });
    assert_eq!(h.session.role(), Role::Disconnected);
    let reconnects = h
        .timers
        .lock()
        .deferred
        .iter()
        .filter(|(_, task)| *task == DeferredTask::Reconnect)
        .count();
    assert_eq!(reconnects, 1);
}

#[test]
fn test_reconnect_gives_up() {
    let mut h = Harness::with_config(
        SessionConfig::default()
            .with_nickname("Me")
            .with_reconnect(1, Duration::from_millis(10)),
    );
    h.session.join_party("b", "a").unwrap();
    h.session
        .handle_transport_event(TransportEvent::Open { peer_id: "a".into() });

    h.session.handle_transport_event(TransportEvent::Error {
        peer_id: Some("a".into()),
        message: "gone".into(),
        fatal: true,
    });
    h.wire.lock().fail_connect = true;
    h.session.on_deferred(DeferredTask::Reconnect);

    assert_eq!(h.session.role(), Role::Unattached);
    assert_eq!(h.events.ended.lock().len(), 1);
}

#[test]
fn test_initial_join_failure_not_retried() {
    let mut h = Harness::new();
    h.session.join_party("b", "a").unwrap();
    h.session.handle_transport_event(TransportEvent::Error {
        peer_id: Some("a".into()),
        message: "peer-unavailable".into(),
        fatal: false,
    });
    assert_eq!(h.session.role(), Role::Unattached);
    assert!(h.timers.lock().deferred.is_empty());
}

// ============================================================================
// UI-level messages
// ============================================================================

#[test]
fn test_chat_and_passthrough() {
    let mut h = Harness::joined("b", &[("a", true), ("b", false)]);
    h.deliver("a", Message::Chat {
        message: "hello".into(),
        sender_name: "Ann".into(),
    });
    assert_eq!(*h.events.chats.lock(), [("Ann".to_string(), "hello".to_string())]);

    h.session.handle_transport_event(TransportEvent::Data {
        from: "a".into(),
        payload: r#"{"type":"PING","pingId":1}"#.into(),
    });
    assert_eq!(h.events.passthrough.lock()[0].0, "PING");

    assert_eq!(h.session.send_chat("  "), Err(SessionError::EmptyMessage));
    h.session.send_chat(" hi ").unwrap();
    assert_eq!(
        h.take_sent(),
        [Message::Chat {
            message: "hi".into(),
            sender_name: "Me".into()
        }]
    );
}

#[test]
fn test_connection_test_round_trip() {
    let mut h = Harness::hosting_with_member();
    h.session.test_connection().unwrap();
    let timestamp = match h.take_sent().as_slice() {
        [Message::ConnectionTest { timestamp, .. }] => *timestamp,
        other => panic!("unexpected {:?}", other),
    };

    h.deliver("b", Message::ConnectionTestResponse {
        message: "Response from joiner".into(),
        original_timestamp: timestamp,
        response_timestamp: timestamp,
    });
    assert!(h
        .notices()
        .iter()
        .any(|n| matches!(n, Notice::LinkMeasured { peer_id, .. } if peer_id == "b")));

    h.deliver("b", Message::ConnectionTest {
        message: "Testing connection from joiner".into(),
        timestamp: 7,
    });
    assert!(matches!(
        h.take_sent().as_slice(),
        [Message::ConnectionTestResponse {
            original_timestamp: 7,
            ..
        }]
    ));
}

#[test]
fn test_connection_test_measures_every_member() {
    let mut h = Harness::hosting_with_member();
    h.session
        .handle_transport_event(TransportEvent::Open { peer_id: "c".into() });
    h.deliver("c", Message::UserInfo {
        nickname: "Cat".into(),
    });
    h.take_sent();

    h.session.test_connection().unwrap();
    let timestamp = match h.take_sent().as_slice() {
        [Message::ConnectionTest { timestamp, .. }] => *timestamp,
        other => panic!("unexpected {:?}", other),
    };
    for peer in ["b", "c", "b"] {
        h.deliver(peer, Message::ConnectionTestResponse {
            message: "Response from joiner".into(),
            original_timestamp: timestamp,
            response_timestamp: timestamp,
        });
    }

    let measured: Vec<String> = h
        .notices()
        .into_iter()
        .filter_map(|n| match n {
            Notice::LinkMeasured { peer_id, .. } => Some(peer_id),
            _ => None,
        })
        .collect();
    assert_eq!(measured, ["b", "c"]);
}

#[test]
fn test_nickname_change() {
    let mut h = Harness::joined("b", &[("a", true), ("b", false)]);
    h.session.set_nickname("Bee");
    assert_eq!(
        h.take_sent(),
        [Message::UserInfo {
            nickname: "Bee".into()
        }]
    );
}
