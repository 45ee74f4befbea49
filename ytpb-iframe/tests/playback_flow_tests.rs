//! Integration tests for end-to-end playback tracking
//!
//! Covers:
//! - Started, paused, resumed, ended and replayed classification
//! - Played segment and total time accounting
//! - Milestones in seconds and percent, once per pass, again after a replay
//! - Live broadcasts: video type and milestones relative to the live start
//! - Plain `video playing` triggers alongside refined ones
//! - Error, quality and removal payloads
//!
//! The tracker is driven synchronously on the simulation host; heartbeats are
//! ticked by hand.

use serde_json::json;
use ytpb_common::config::TrackerConfig;
use ytpb_common::events::{NativePlayerState, VideoType};
use ytpb_iframe::sim::{EventLog, RecordingWatcher, SimulatedHost, SimulatedPlayer, VideoScript};
use ytpb_iframe::{EventSettings, EventType, ExternalHeartbeat, NativeEvent, Tracker, TrackingSettings};

const PLAYER: &str = "hero";

struct Page {
    host: SimulatedHost,
    heartbeat: ExternalHeartbeat,
    watcher: RecordingWatcher,
    tracker: Tracker,
}

impl Page {
    fn new(script: VideoScript) -> Self {
        let host = SimulatedHost::new("https://example.com");
        host.set_api_ready(true);
        host.add_player(Some(PLAYER), "https://www.youtube.com/embed/abc", script);

        let heartbeat = ExternalHeartbeat::new();
        let watcher = RecordingWatcher::new();
        let tracker = Tracker::new(
            TrackerConfig::default(),
            Box::new(host.clone()),
            Box::new(heartbeat.clone()),
            Box::new(watcher.clone()),
        );
        Self {
            host,
            heartbeat,
            watcher,
            tracker,
        }
    }

    fn register(&mut self, event_type: EventType, settings: serde_json::Value, log: &EventLog) {
        let settings: EventSettings = serde_json::from_value(settings).unwrap();
        self.tracker.register(event_type, &settings, log.trigger());
    }

    /// Enable tracking and deliver the ready callback
    fn start(&mut self) -> SimulatedPlayer {
        let outcome = self
            .tracker
            .enable_video_playback_tracking(&TrackingSettings::default());
        assert_eq!(outcome.created, vec![PLAYER.to_string()]);
        self.tracker.handle_native(NativeEvent::ready(PLAYER));
        self.host.player(PLAYER).unwrap()
    }

    fn state(&mut self, player: &SimulatedPlayer, state: NativePlayerState) -> usize {
        player.set_state(state);
        self.tracker
            .handle_native(NativeEvent::state_change(PLAYER, state))
    }

    /// Tick once per whole second from `from` through `to`
    fn play(&mut self, player: &SimulatedPlayer, from: u32, to: u32) {
        for second in from..=to {
            player.seek(second as f64);
            self.tracker.heartbeat_tick(PLAYER);
        }
    }
}

#[test]
fn test_on_demand_lifecycle() {
    let mut page = Page::new(VideoScript::on_demand("abc", 200.0));
    let log = EventLog::new();
    page.register(
        EventType::VideoPlaying,
        json!({ "trackStarted": "yes", "trackResumed": "yes", "trackReplayed": "yes" }),
        &log,
    );
    page.register(EventType::VideoPaused, json!({}), &log);
    page.register(EventType::VideoEnded, json!({}), &log);
    page.register(EventType::PlayerRemoved, json!({}), &log);

    let player = page.start();
    assert_eq!(page.watcher.watched(), vec![PLAYER.to_string()]);

    assert_eq!(page.state(&player, NativePlayerState::Playing), 1);
    assert!(page.heartbeat.is_running(PLAYER));
    page.play(&player, 1, 60);

    assert_eq!(page.state(&player, NativePlayerState::Paused), 1);
    assert!(!page.heartbeat.is_running(PLAYER));
    let paused = log.last(EventType::VideoPaused).unwrap();
    assert_eq!(paused.youtube.video_current_time, 60.0);
    assert_eq!(paused.youtube.video_played_segment_time, Some(60.0));
    assert_eq!(paused.youtube.video_played_total_time, Some(60.0));
    assert_eq!(paused.youtube.video_url, "https://www.youtube.com/watch?v=abc");
    assert_eq!(paused.youtube.video_type, VideoType::VideoOnDemand);

    // duplicate pause is dropped
    assert_eq!(page.state(&player, NativePlayerState::Paused), 0);

    assert_eq!(page.state(&player, NativePlayerState::Playing), 1);
    page.play(&player, 61, 80);

    assert_eq!(page.state(&player, NativePlayerState::Ended), 1);
    let ended = log.last(EventType::VideoEnded).unwrap();
    assert_eq!(ended.youtube.video_current_time, 200.0);
    assert_eq!(ended.youtube.video_played_segment_time, Some(20.0));
    assert_eq!(ended.youtube.video_played_total_time, Some(80.0));

    // the platform reports a replay as playing, buffering, playing
    player.seek(0.0);
    assert_eq!(page.state(&player, NativePlayerState::Playing), 0);
    page.state(&player, NativePlayerState::Buffering);
    assert_eq!(page.state(&player, NativePlayerState::Playing), 1);

    // removal while playing
    player.seek(3.0);
    page.tracker.heartbeat_tick(PLAYER);
    assert_eq!(page.tracker.element_removed(PLAYER), 1);
    assert!(page.tracker.player_ids().is_empty());
    assert!(page.watcher.watched().is_empty());
    assert!(page.heartbeat.running_players().is_empty());

    assert_eq!(
        log.event_types(),
        vec![
            EventType::VideoStarted,
            EventType::VideoPaused,
            EventType::VideoResumed,
            EventType::VideoEnded,
            EventType::VideoReplayed,
            EventType::PlayerRemoved,
        ]
    );
    let removed = log.last(EventType::PlayerRemoved).unwrap();
    assert_eq!(removed.youtube.video_played_segment_time, Some(3.0));
}

#[test]
fn test_milestones_fire_once_per_pass() {
    let mut page = Page::new(VideoScript::on_demand("abc", 200.0));
    let log = EventLog::new();
    page.register(
        EventType::VideoMilestone,
        json!({ "fixedMilestoneAmounts": [25, 50], "fixedMilestoneUnit": "percent" }),
        &log,
    );
    page.register(
        EventType::VideoMilestone,
        json!({ "fixedMilestoneAmounts": [5], "fixedMilestoneUnit": "seconds" }),
        &log,
    );
    let replays = EventLog::new();
    page.register(
        EventType::VideoPlaying,
        json!({ "trackReplayed": "yes", "doNotTrack": "yes" }),
        &replays,
    );

    let player = page.start();
    page.state(&player, NativePlayerState::Playing);
    page.play(&player, 0, 60);
    assert_eq!(log.milestones(), vec!["5s", "25%"]);

    let reached = log.last(EventType::VideoMilestone).unwrap();
    assert_eq!(reached.youtube.video_current_time, 50.0);
    assert_eq!(reached.native_event.kind, ytpb_iframe::NativeEventKind::StateChange);

    // pausing and resuming past a milestone does not fire it again
    page.state(&player, NativePlayerState::Paused);
    page.state(&player, NativePlayerState::Playing);
    page.play(&player, 61, 99);
    assert_eq!(log.milestones(), vec!["5s", "25%"]);

    page.play(&player, 100, 100);
    assert_eq!(log.milestones(), vec!["5s", "25%", "50%"]);

    page.state(&player, NativePlayerState::Ended);
    player.seek(0.0);
    page.state(&player, NativePlayerState::Playing);
    page.state(&player, NativePlayerState::Buffering);
    page.state(&player, NativePlayerState::Playing);
    assert_eq!(replays.event_types(), vec![EventType::VideoReplayed]);

    page.play(&player, 1, 6);
    assert_eq!(log.milestones(), vec!["5s", "25%", "50%", "5s"]);
}

#[test]
fn test_replay_after_final_milestone_fires_all_again() {
    let mut page = Page::new(VideoScript::on_demand("abc", 60.0));
    let log = EventLog::new();
    page.register(
        EventType::VideoMilestone,
        json!({ "fixedMilestoneAmounts": [5, 50], "fixedMilestoneUnit": "seconds" }),
        &log,
    );

    let player = page.start();
    page.state(&player, NativePlayerState::Playing);
    page.play(&player, 0, 60);
    page.state(&player, NativePlayerState::Ended);
    assert_eq!(log.milestones(), vec!["5s", "50s"]);

    player.seek(0.0);
    page.state(&player, NativePlayerState::Playing);
    page.play(&player, 1, 4);
    assert_eq!(log.milestones(), vec!["5s", "50s"]);

    // a seek past both milestones reports them in order
    player.seek(55.0);
    page.tracker.heartbeat_tick(PLAYER);
    assert_eq!(log.milestones(), vec!["5s", "50s", "5s", "50s"]);
}

#[test]
fn test_seek_past_milestones_catches_up_in_order() {
    let mut page = Page::new(VideoScript::on_demand("abc", 100.0));
    let log = EventLog::new();
    page.register(
        EventType::VideoMilestone,
        json!({ "fixedMilestoneAmounts": [10, 20, 30], "fixedMilestoneUnit": "seconds" }),
        &log,
    );

    let player = page.start();
    page.state(&player, NativePlayerState::Playing);
    page.play(&player, 0, 1);
    player.seek(25.0);
    page.tracker.heartbeat_tick(PLAYER);

    assert_eq!(log.milestones(), vec!["10s", "20s"]);
}

#[test]
fn test_live_broadcast() {
    let mut page = Page::new(VideoScript::live("live1"));
    let log = EventLog::new();
    page.register(EventType::VideoPlaying, json!({}), &log);
    page.register(
        EventType::VideoMilestone,
        json!({ "fixedMilestoneAmounts": [50], "fixedMilestoneUnit": "percent" }),
        &log,
    );
    page.register(
        EventType::VideoMilestone,
        json!({ "fixedMilestoneAmounts": [10], "fixedMilestoneUnit": "seconds" }),
        &log,
    );

    let player = page.start();
    player.seek(100.4);
    page.state(&player, NativePlayerState::Playing);

    let playing = log.last(EventType::VideoPlaying).unwrap();
    assert_eq!(playing.youtube.video_type, VideoType::Live);
    assert_eq!(page.tracker.session(PLAYER).unwrap().video_start_time, 100.0);

    page.play(&player, 101, 109);
    assert!(log.milestones().is_empty());

    // live milestones count from where the viewer joined; percent ones never fire
    page.play(&player, 110, 200);
    assert_eq!(log.milestones(), vec!["10s"]);
}

#[test]
fn test_plain_playing_triggers_receive_refined_events() {
    let mut page = Page::new(VideoScript::on_demand("abc", 60.0));
    let refined = EventLog::new();
    let plain = EventLog::new();
    page.register(
        EventType::VideoPlaying,
        json!({ "trackStarted": true, "doNotTrack": true }),
        &refined,
    );
    page.register(EventType::VideoPlaying, json!({}), &plain);

    let player = page.start();
    assert_eq!(page.state(&player, NativePlayerState::Playing), 2);

    assert_eq!(refined.event_types(), vec![EventType::VideoStarted]);
    assert_eq!(plain.event_types(), vec![EventType::VideoPlaying]);

    page.state(&player, NativePlayerState::Paused);
    page.state(&player, NativePlayerState::Playing);
    assert_eq!(refined.len(), 1);
    assert_eq!(
        plain.event_types(),
        vec![EventType::VideoPlaying, EventType::VideoPlaying]
    );
}

#[test]
fn test_matching_selector_limits_rules() {
    let mut page = Page::new(VideoScript::on_demand("abc", 60.0));
    page.host.add_player(
        Some("sidebar"),
        "https://www.youtube.com/embed/xyz",
        VideoScript::on_demand("xyz", 30.0),
    );
    let log = EventLog::new();
    page.register(
        EventType::PlayerReady,
        json!({ "matchingSelector": "#sidebar" }),
        &log,
    );

    page.tracker
        .enable_video_playback_tracking(&TrackingSettings::default());
    page.tracker.handle_native(NativeEvent::ready(PLAYER));
    page.tracker.handle_native(NativeEvent::ready("sidebar"));

    assert_eq!(log.len(), 1);
    assert_eq!(log.events()[0].youtube.player, "sidebar");
    assert_eq!(log.events()[0].youtube.video_id, "xyz");
}

#[test]
fn test_error_and_quality_payloads() {
    let mut page = Page::new(VideoScript::on_demand("abc", 60.0));
    let log = EventLog::new();
    page.register(EventType::PlayerError, json!({}), &log);
    page.register(EventType::PlaybackQualityChanged, json!({}), &log);
    page.register(EventType::PlaybackRateChanged, json!({}), &log);

    page.start();
    assert_eq!(page.tracker.handle_native(NativeEvent::error(PLAYER, 150)), 1);
    let error = log.last(EventType::PlayerError).unwrap();
    assert_eq!(error.youtube.error_code, Some(150));
    assert!(error.youtube.error_message.is_some());

    page.tracker
        .handle_native(NativeEvent::playback_quality_change(PLAYER, "hd1080"));
    let quality = log.last(EventType::PlaybackQualityChanged).unwrap();
    assert_eq!(quality.youtube.video_playback_quality, "hd1080");

    // repeated non-playback events are not suppressed
    page.tracker
        .handle_native(NativeEvent::playback_rate_change(PLAYER, 1.5));
    page.tracker
        .handle_native(NativeEvent::playback_rate_change(PLAYER, 1.5));
    assert_eq!(log.count(EventType::PlaybackRateChanged), 2);
}

#[test]
fn test_removal_after_pause_adds_no_play_time() {
    let mut page = Page::new(VideoScript::on_demand("abc", 60.0));
    let log = EventLog::new();
    page.register(EventType::PlayerRemoved, json!({}), &log);

    let player = page.start();
    page.state(&player, NativePlayerState::Playing);
    page.play(&player, 1, 10);
    page.state(&player, NativePlayerState::Paused);
    player.seek(30.0);

    assert_eq!(page.tracker.page_unloaded(), 1);
    let removed = log.last(EventType::PlayerRemoved).unwrap();
    assert_eq!(removed.youtube.video_played_segment_time, Some(0.0));
    assert_eq!(removed.youtube.video_played_total_time, Some(10.0));
    assert_eq!(removed.youtube.video_current_time, 10.0);
}

#[test]
fn test_heartbeat_stops_when_player_stops_without_callback() {
    let mut page = Page::new(VideoScript::on_demand("abc", 60.0));
    let player = page.start();
    page.state(&player, NativePlayerState::Playing);
    assert!(page.heartbeat.is_running(PLAYER));

    player.set_state(NativePlayerState::Paused);
    page.tracker.heartbeat_tick(PLAYER);
    assert!(!page.heartbeat.is_running(PLAYER));
}
