//! Player state type definitions
//!
//! Native state codes reported by the IFrame player, platform error codes and the
//! live/on-demand video classification.

use serde::{Deserialize, Serialize};

use super::EventType;

/// Native player state as reported by `onStateChange` / `getPlayerState()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativePlayerState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

impl NativePlayerState {
    /// Map a native numeric state code; unknown codes yield `None`
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(NativePlayerState::Unstarted),
            0 => Some(NativePlayerState::Ended),
            1 => Some(NativePlayerState::Playing),
            2 => Some(NativePlayerState::Paused),
            3 => Some(NativePlayerState::Buffering),
            5 => Some(NativePlayerState::Cued),
            _ => None,
        }
    }

    /// Native numeric state code
    pub fn code(&self) -> i64 {
        match self {
            NativePlayerState::Unstarted => -1,
            NativePlayerState::Ended => 0,
            NativePlayerState::Playing => 1,
            NativePlayerState::Paused => 2,
            NativePlayerState::Buffering => 3,
            NativePlayerState::Cued => 5,
        }
    }

    /// Raw extension event type for this state, before `playing` is refined
    pub fn event_type(&self) -> EventType {
        match self {
            NativePlayerState::Unstarted => EventType::VideoUnstarted,
            NativePlayerState::Ended => EventType::VideoEnded,
            NativePlayerState::Playing => EventType::VideoPlaying,
            NativePlayerState::Paused => EventType::VideoPaused,
            NativePlayerState::Buffering => EventType::VideoBuffering,
            NativePlayerState::Cued => EventType::VideoCued,
        }
    }
}

impl std::fmt::Display for NativePlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativePlayerState::Unstarted => write!(f, "unstarted"),
            NativePlayerState::Ended => write!(f, "ended"),
            NativePlayerState::Playing => write!(f, "playing"),
            NativePlayerState::Paused => write!(f, "paused"),
            NativePlayerState::Buffering => write!(f, "buffering"),
            NativePlayerState::Cued => write!(f, "cued"),
        }
    }
}

/// Video type, fixed when the player becomes ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoType {
    /// Broadcast without a fixed duration
    #[serde(rename = "live")]
    Live,
    #[serde(rename = "video-on-demand")]
    VideoOnDemand,
}

impl VideoType {
    /// A duration of zero at ready time means a live broadcast
    pub fn from_ready_duration(duration: f64) -> Self {
        if duration == 0.0 {
            VideoType::Live
        } else {
            VideoType::VideoOnDemand
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoType::Live => "live",
            VideoType::VideoOnDemand => "video-on-demand",
        }
    }
}

impl std::fmt::Display for VideoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform error codes and their messages
pub const PLAYER_ERROR_CODES: [(i64, &str); 5] = [
    (2, "Request contains an invalid parameter value (error 2)"),
    (5, "Requested content cannot be played in an HTML5 player (error 5)"),
    (100, "Requested video was not found (error 100)"),
    (
        101,
        "Owner of the requested video does not allow it to be played in embedded players (error 101)",
    ),
    (
        150,
        "Owner of the requested video does not allow it to be played in embedded players (error 150)",
    ),
];

/// Message for a platform error code, `None` when the code is unmapped
pub fn error_message(code: i64) -> Option<&'static str> {
    PLAYER_ERROR_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, message)| *message)
}
