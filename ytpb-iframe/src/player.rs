//! Native player boundary
//!
//! `PlayerApi` is the subset of the IFrame player's methods the tracker reads.
//! `NativeEvent` is what the player's callbacks deliver: which callback fired, the
//! player it fired for (identified by its element id) and the callback's `data`.

use serde::{Deserialize, Serialize};
use ytpb_common::events::NativePlayerState;
use ytpb_common::EventType;

/// Metadata of the loaded video (`getVideoData()`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoData {
    pub video_id: String,
    pub title: String,
}

/// Read access to a native player instance
///
/// Implemented by the host environment for real players and by
/// [`crate::sim::SimulatedPlayer`] for scripted ones.
pub trait PlayerApi: Send {
    /// Playhead position in seconds
    fn current_time(&self) -> f64;

    /// Duration in seconds; 0 for live broadcasts at ready time
    fn duration(&self) -> f64;

    /// Current native state, `None` when the player reports an unknown code
    fn player_state(&self) -> Option<NativePlayerState>;

    fn is_muted(&self) -> bool;

    /// Volume, 0-100
    fn volume(&self) -> u32;

    fn playback_rate(&self) -> f64;

    fn playback_quality(&self) -> String;

    /// Fraction of the video the player has buffered, 0.0-1.0
    fn video_loaded_fraction(&self) -> f64;

    fn video_data(&self) -> VideoData;

    fn video_url(&self) -> String;

    /// Names of loaded modules with exposed API methods (`getOptions()`)
    fn module_names(&self) -> Vec<String>;
}

/// Which native callback produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NativeEventKind {
    ApiChange,
    AutoplayBlocked,
    Error,
    PlaybackQualityChange,
    PlaybackRateChange,
    Ready,
    StateChange,
    /// Synthesized when the player's element leaves the page; the platform has no
    /// native removal callback
    Removed,
}

/// `data` carried by a native callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NativeData {
    Code(i64),
    Rate(f64),
    Text(String),
}

/// A native callback invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeEvent {
    pub kind: NativeEventKind,
    /// Element id of the player the callback fired for
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NativeData>,
}

impl NativeEvent {
    pub fn new(kind: NativeEventKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: NativeData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn ready(target: impl Into<String>) -> Self {
        Self::new(NativeEventKind::Ready, target)
    }

    pub fn state_change(target: impl Into<String>, state: NativePlayerState) -> Self {
        Self::new(NativeEventKind::StateChange, target).with_data(NativeData::Code(state.code()))
    }

    pub fn error(target: impl Into<String>, code: i64) -> Self {
        Self::new(NativeEventKind::Error, target).with_data(NativeData::Code(code))
    }

    pub fn playback_quality_change(target: impl Into<String>, quality: impl Into<String>) -> Self {
        Self::new(NativeEventKind::PlaybackQualityChange, target)
            .with_data(NativeData::Text(quality.into()))
    }

    pub fn playback_rate_change(target: impl Into<String>, rate: f64) -> Self {
        Self::new(NativeEventKind::PlaybackRateChange, target).with_data(NativeData::Rate(rate))
    }

    pub fn removed(target: impl Into<String>) -> Self {
        Self::new(NativeEventKind::Removed, target)
    }

    /// Numeric `data`, if any
    pub fn code(&self) -> Option<i64> {
        match self.data {
            Some(NativeData::Code(code)) => Some(code),
            _ => None,
        }
    }

    /// Textual `data`, if any
    pub fn text(&self) -> Option<&str> {
        match &self.data {
            Some(NativeData::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Extension event type before `video playing` is refined
    ///
    /// State changes with codes the platform does not document yield `None`.
    pub fn raw_event_type(&self) -> Option<EventType> {
        match self.kind {
            NativeEventKind::ApiChange => Some(EventType::ApiChanged),
            NativeEventKind::AutoplayBlocked => Some(EventType::AutoplayBlocked),
            NativeEventKind::Error => Some(EventType::PlayerError),
            NativeEventKind::PlaybackQualityChange => Some(EventType::PlaybackQualityChanged),
            NativeEventKind::PlaybackRateChange => Some(EventType::PlaybackRateChanged),
            NativeEventKind::Ready => Some(EventType::PlayerReady),
            NativeEventKind::Removed => Some(EventType::PlayerRemoved),
            NativeEventKind::StateChange => self
                .code()
                .and_then(NativePlayerState::from_code)
                .map(|state| state.event_type()),
        }
    }
}
