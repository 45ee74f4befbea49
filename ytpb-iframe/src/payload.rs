//! Event payloads delivered to triggers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use ytpb_common::events::VideoType;
use ytpb_common::EventType;

use crate::player::NativeEvent;
use crate::session::PlayerSession;

/// Snapshot of the player's state at dispatch time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStateData {
    /// Element id of the player
    pub player: String,
    pub player_state: EventType,
    /// Playhead position in whole seconds
    pub video_current_time: f64,
    pub video_duration: f64,
    pub video_id: String,
    pub video_loaded_fraction: f64,
    pub video_muted: bool,
    pub video_playback_quality: String,
    pub video_playback_rate: f64,
    pub video_title: String,
    pub video_type: VideoType,
    pub video_url: String,
    pub video_volume: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Loaded module names joined with `,`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_names: Option<String>,

    /// Label of the milestone reached, e.g. `25%`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_milestone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_played_segment_time: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_played_total_time: Option<f64>,
}

impl VideoStateData {
    /// State data from the session's last recorded player values
    pub fn from_session(session: &PlayerSession, player_state: EventType) -> Self {
        Self {
            player: session.player_id.clone(),
            player_state,
            video_current_time: session.video_current_time.floor(),
            video_duration: session.video_duration,
            video_id: session.video_id.clone(),
            video_loaded_fraction: session.video_loaded_fraction,
            video_muted: session.video_muted,
            video_playback_quality: session.video_playback_quality.clone(),
            video_playback_rate: session.video_playback_rate,
            video_title: session.video_title.clone(),
            video_type: session.video_type(),
            video_url: session.video_url.clone(),
            video_volume: session.video_volume,
            error_code: None,
            error_message: None,
            module_names: None,
            video_milestone: None,
            video_played_segment_time: None,
            video_played_total_time: None,
        }
    }
}

/// Event handed to a trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoEvent {
    /// Element id the event is bound to
    pub element: String,
    pub target: String,
    pub native_event: NativeEvent,
    pub youtube: VideoStateData,
    pub timestamp: DateTime<Utc>,
}

impl VideoEvent {
    pub fn new(native_event: NativeEvent, youtube: VideoStateData) -> Self {
        Self {
            element: youtube.player.clone(),
            target: youtube.player.clone(),
            native_event,
            youtube,
            timestamp: ytpb_common::time::now(),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.youtube.player_state
    }

    /// Copy of this event reported as `playerState`
    pub fn with_player_state(&self, player_state: EventType) -> Self {
        let mut event = self.clone();
        event.youtube.player_state = player_state;
        event
    }
}

/// Query parameter carrying the start offset in whole seconds
pub const TIME_PARAMETER: &str = "t";

/// Remove the numeric `t` (start offset) query parameter from a video URL
///
/// URLs that do not parse or carry no offset come back unchanged.
pub fn strip_time_parameter(video_url: &str) -> String {
    let Ok(mut url) = Url::parse(video_url) else {
        return video_url.to_string();
    };

    let is_offset = |name: &str, value: &str| {
        name == TIME_PARAMETER && !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
    };
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if !pairs.iter().any(|(name, value)| is_offset(name, value)) {
        return video_url.to_string();
    }

    let kept: Vec<(String, String)> = pairs
        .into_iter()
        .filter(|(name, value)| !is_offset(name, value))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_time_parameter() {
        assert_eq!(
            strip_time_parameter("https://www.youtube.com/watch?v=abc&t=42"),
            "https://www.youtube.com/watch?v=abc"
        );
        assert_eq!(
            strip_time_parameter("https://www.youtube.com/watch?t=42&v=abc"),
            "https://www.youtube.com/watch?v=abc"
        );
        assert_eq!(
            strip_time_parameter("https://www.youtube.com/watch?v=abc&t=42&list=xyz"),
            "https://www.youtube.com/watch?v=abc&list=xyz"
        );
        assert_eq!(
            strip_time_parameter("https://www.youtube.com/watch?t=42"),
            "https://www.youtube.com/watch"
        );
        assert_eq!(
            strip_time_parameter("https://www.youtube.com/watch?v=abc&tab=1"),
            "https://www.youtube.com/watch?v=abc&tab=1"
        );
        assert_eq!(
            strip_time_parameter("https://youtu.be/abc"),
            "https://youtu.be/abc"
        );
    }

    #[test]
    fn test_strip_time_parameter_keeps_non_numeric_offsets() {
        assert_eq!(
            strip_time_parameter("https://www.youtube.com/watch?v=abc&t=1m30s"),
            "https://www.youtube.com/watch?v=abc&t=1m30s"
        );
        assert_eq!(
            strip_time_parameter("https://www.youtube.com/watch?v=abc&t="),
            "https://www.youtube.com/watch?v=abc&t="
        );
        assert_eq!(
            strip_time_parameter("https://www.youtube.com/watch?v=abc&t=42#comments"),
            "https://www.youtube.com/watch?v=abc#comments"
        );
        assert_eq!(strip_time_parameter("not a url?t=42"), "not a url?t=42");
    }

    #[test]
    fn test_state_data_floors_current_time_and_serializes_camel_case() {
        let mut session = PlayerSession::new("player1");
        session.video_current_time = 12.9;
        session.video_duration = 200.0;
        session.video_id = "abc".to_string();

        let mut data = VideoStateData::from_session(&session, EventType::VideoPaused);
        data.video_played_total_time = Some(12.5);
        assert_eq!(data.video_current_time, 12.0);
        assert_eq!(data.video_type, VideoType::VideoOnDemand);

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["playerState"], "video paused");
        assert_eq!(json["videoCurrentTime"], 12.0);
        assert_eq!(json["videoType"], "video-on-demand");
        assert_eq!(json["videoPlayedTotalTime"], 12.5);
        assert!(json.get("errorCode").is_none());
        assert!(json.get("videoMilestone").is_none());
    }

    #[test]
    fn test_event_with_player_state_override() {
        let session = PlayerSession::new("player1");
        let data = VideoStateData::from_session(&session, EventType::VideoStarted);
        let event = VideoEvent::new(NativeEvent::ready("player1"), data);

        let generic = event.with_player_state(EventType::VideoPlaying);
        assert_eq!(generic.event_type(), EventType::VideoPlaying);
        assert_eq!(event.event_type(), EventType::VideoStarted);
        assert_eq!(generic.element, "player1");
        assert_eq!(generic.target, "player1");
    }
}
