//! Integration tests for scenario replay
//!
//! Covers:
//! - The bundled demo scenario replays to the expected event sequence
//! - Recorded events serialize with the rule name next to the event fields
//! - Tracker configuration files change replay behavior

use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use ytpb_common::config::TrackerConfig;
use ytpb_iframe::scenario::{run_scenario, Scenario};
use ytpb_iframe::EventType;

fn demo_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("demos")
        .join("watch_session.toml")
}

#[test]
fn test_demo_scenario() {
    let scenario = Scenario::load(&demo_path()).unwrap();
    let events = run_scenario(&scenario, TrackerConfig::default()).unwrap();

    let summary: Vec<(&str, EventType, Option<&str>)> = events
        .iter()
        .map(|recorded| {
            (
                recorded.rule.as_str(),
                recorded.event.event_type(),
                recorded.event.youtube.video_milestone.as_deref(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("playback", EventType::VideoStarted, None),
            ("progress", EventType::VideoMilestone, Some("25%")),
            ("interruptions", EventType::VideoPaused, None),
            ("playback", EventType::VideoResumed, None),
            ("progress", EventType::VideoMilestone, Some("50%")),
            ("progress", EventType::VideoMilestone, Some("75%")),
            ("completion", EventType::VideoEnded, None),
            ("playback", EventType::VideoReplayed, None),
            ("exit", EventType::PlayerRemoved, None),
        ]
    );

    let ended = &events[6].event.youtube;
    assert_eq!(ended.video_played_total_time, Some(60.0));

    let removed = &events[8].event.youtube;
    assert_eq!(removed.video_played_segment_time, Some(5.0));
    assert_eq!(removed.video_played_total_time, Some(65.0));
}

#[test]
fn test_recorded_event_json() {
    let scenario = Scenario::load(&demo_path()).unwrap();
    let events = run_scenario(&scenario, TrackerConfig::default()).unwrap();

    let json = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(json["rule"], "playback");
    assert_eq!(json["element"], "demo");
    assert_eq!(json["target"], "demo");
    assert_eq!(json["youtube"]["playerState"], "video started");
    assert_eq!(json["youtube"]["videoId"], "dQw4w9WgXcQ");
    assert_eq!(json["youtube"]["videoType"], "video-on-demand");
    assert_eq!(json["nativeEvent"]["kind"], "stateChange");
    assert_eq!(json["nativeEvent"]["data"], 1);
}

#[test]
fn test_heartbeat_interval_from_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"heartbeat_interval_ms = 10000\n").unwrap();
    let config = TrackerConfig::load(Some(file.path())).unwrap();

    // with a 10s heartbeat the playhead is sampled at 10s and 20s only, so the
    // 25% milestone (15s) is reported at the 20s sample
    let scenario = Scenario::load(&demo_path()).unwrap();
    let events = run_scenario(&scenario, config).unwrap();

    let first_milestone = events
        .iter()
        .find(|recorded| recorded.event.event_type() == EventType::VideoMilestone)
        .unwrap();
    assert_eq!(first_milestone.event.youtube.video_milestone.as_deref(), Some("25%"));
    assert_eq!(first_milestone.event.youtube.video_current_time, 20.0);
}
