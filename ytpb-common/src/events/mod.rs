//! Event types for YTPB
//!
//! The extension's own classification of moments in playback. This is a superset of
//! the native player states: it adds the synthetic `started`, `replayed` and `resumed`
//! refinements of `playing`, plus `milestone` and `removed`.
//!
//! The wire strings are part of the rule configuration format and must not change.

mod state_types;

pub use state_types::{error_message, NativePlayerState, VideoType, PLAYER_ERROR_CODES};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Extension event types
///
/// Serialized as the exact strings rules are configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "module with exposed API changed")]
    ApiChanged,
    #[serde(rename = "autoplay blocked")]
    AutoplayBlocked,
    #[serde(rename = "playback quality changed")]
    PlaybackQualityChanged,
    #[serde(rename = "playback rate changed")]
    PlaybackRateChanged,
    #[serde(rename = "player error")]
    PlayerError,
    #[serde(rename = "player ready")]
    PlayerReady,
    #[serde(rename = "player removed")]
    PlayerRemoved,
    #[serde(rename = "video buffering")]
    VideoBuffering,
    #[serde(rename = "video cued")]
    VideoCued,
    #[serde(rename = "video ended")]
    VideoEnded,
    #[serde(rename = "video milestone")]
    VideoMilestone,
    #[serde(rename = "video paused")]
    VideoPaused,
    #[serde(rename = "video playing")]
    VideoPlaying,
    #[serde(rename = "video replayed")]
    VideoReplayed,
    #[serde(rename = "video resumed")]
    VideoResumed,
    #[serde(rename = "video started")]
    VideoStarted,
    #[serde(rename = "video unstarted")]
    VideoUnstarted,
}

impl EventType {
    /// Every event type, in wire-string order
    pub const ALL: [EventType; 17] = [
        EventType::ApiChanged,
        EventType::AutoplayBlocked,
        EventType::PlaybackQualityChanged,
        EventType::PlaybackRateChanged,
        EventType::PlayerError,
        EventType::PlayerReady,
        EventType::PlayerRemoved,
        EventType::VideoBuffering,
        EventType::VideoCued,
        EventType::VideoEnded,
        EventType::VideoMilestone,
        EventType::VideoPaused,
        EventType::VideoPlaying,
        EventType::VideoReplayed,
        EventType::VideoResumed,
        EventType::VideoStarted,
        EventType::VideoUnstarted,
    ];

    /// Synthetic refinements of `video playing` chosen at classification time
    pub const PLAYING_REFINEMENTS: [EventType; 3] = [
        EventType::VideoStarted,
        EventType::VideoReplayed,
        EventType::VideoResumed,
    ];

    /// Wire string of this event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ApiChanged => "module with exposed API changed",
            EventType::AutoplayBlocked => "autoplay blocked",
            EventType::PlaybackQualityChanged => "playback quality changed",
            EventType::PlaybackRateChanged => "playback rate changed",
            EventType::PlayerError => "player error",
            EventType::PlayerReady => "player ready",
            EventType::PlayerRemoved => "player removed",
            EventType::VideoBuffering => "video buffering",
            EventType::VideoCued => "video cued",
            EventType::VideoEnded => "video ended",
            EventType::VideoMilestone => "video milestone",
            EventType::VideoPaused => "video paused",
            EventType::VideoPlaying => "video playing",
            EventType::VideoReplayed => "video replayed",
            EventType::VideoResumed => "video resumed",
            EventType::VideoStarted => "video started",
            EventType::VideoUnstarted => "video unstarted",
        }
    }

    /// Playback-classified types: subject to duplicate suppression and the only
    /// types ever remembered as the previous event type
    pub fn is_playback(&self) -> bool {
        matches!(
            self,
            EventType::VideoBuffering
                | EventType::VideoCued
                | EventType::VideoEnded
                | EventType::VideoPaused
                | EventType::VideoPlaying
                | EventType::VideoReplayed
                | EventType::VideoResumed
                | EventType::VideoStarted
                | EventType::VideoUnstarted
        )
    }

    /// `video playing` and its synthetic refinements
    pub fn is_playing_family(&self) -> bool {
        matches!(
            self,
            EventType::VideoPlaying
                | EventType::VideoReplayed
                | EventType::VideoResumed
                | EventType::VideoStarted
        )
    }

    /// Types that stop the heartbeat and close the current play segment
    pub fn stops_heartbeat(&self) -> bool {
        matches!(
            self,
            EventType::VideoBuffering
                | EventType::VideoPaused
                | EventType::VideoEnded
                | EventType::PlayerRemoved
        )
    }

    /// Types after which playback counts as interrupted by the user or the network
    pub fn marks_paused(&self) -> bool {
        matches!(
            self,
            EventType::VideoBuffering | EventType::VideoCued | EventType::VideoPaused
        )
    }

    /// Types whose payload reports played segment and total time
    pub fn reports_played_time(&self) -> bool {
        matches!(
            self,
            EventType::VideoBuffering
                | EventType::VideoCued
                | EventType::VideoPaused
                | EventType::VideoEnded
                | EventType::PlayerRemoved
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| Error::UnknownEventType(s.to_string()))
    }
}
