//! Per-player session state
//!
//! One [`PlayerSession`] exists per instantiated player. It carries the lifecycle
//! flags the classifier needs to tell a start from a replay or a resume, the play
//! time accounting, the heartbeat handle and the milestone table.

use std::time::Duration;
use ytpb_common::events::VideoType;
use ytpb_common::EventType;

use crate::element::ElementRef;
use crate::heartbeat::HeartbeatHandle;
use crate::milestones::{compile_milestones, CompiledMilestones, MilestoneCursor};
use crate::payload::strip_time_parameter;
use crate::player::{NativeEvent, PlayerApi};
use crate::triggers::TriggerTable;

/// Milestone table lifecycle
#[derive(Debug, Clone, Default)]
pub enum MilestoneState {
    /// Not compiled yet; requests are still held by the trigger table
    #[default]
    Pending,
    Compiled(CompiledMilestones),
    /// Compiled, but no request produced a milestone
    Unavailable,
}

/// Heartbeat bookkeeping
#[derive(Debug, Clone)]
pub struct HeartbeatState {
    /// Live heartbeat, at most one at a time
    pub handle: Option<HeartbeatHandle>,
    pub period: Duration,
}

/// Mutable state of one player
#[derive(Debug, Clone)]
pub struct PlayerSession {
    /// Element id of the player
    pub player_id: String,

    pub has_started: bool,
    pub has_ended: bool,
    pub has_paused: bool,
    /// Set by the first playing after an end; the replay is reported on the next one
    pub has_replayed: bool,

    /// Playhead when the open play segment began, `None` with no open segment
    pub play_start_time: Option<f64>,
    /// Playhead at the last heartbeat sample
    pub play_stop_time: f64,
    pub play_segment_time: f64,
    pub play_total_time: f64,

    /// Offset of live milestones, captured when a live video first starts
    pub video_start_time: f64,
    pub is_live_event: bool,

    pub video_current_time: f64,
    pub video_duration: f64,
    pub video_id: String,
    pub video_loaded_fraction: f64,
    pub video_muted: bool,
    pub video_playback_quality: String,
    pub video_playback_rate: f64,
    pub video_title: String,
    pub video_url: String,
    pub video_volume: u32,

    pub heartbeat: HeartbeatState,

    /// Native event that started the running heartbeat; milestone payloads carry it
    pub heartbeat_origin: Option<NativeEvent>,

    pub milestones: MilestoneState,
    pub next_milestone: Option<MilestoneCursor>,
    /// Time of the last milestone dispatched; a playhead before it starts a new pass
    pub last_milestone_time: Option<f64>,

    pub previous_event_type: Option<EventType>,

    pub triggers: TriggerTable,
}

impl PlayerSession {
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            has_started: false,
            has_ended: false,
            has_paused: false,
            has_replayed: false,
            play_start_time: None,
            play_stop_time: 0.0,
            play_segment_time: 0.0,
            play_total_time: 0.0,
            video_start_time: 0.0,
            is_live_event: false,
            video_current_time: 0.0,
            video_duration: 0.0,
            video_id: String::new(),
            video_loaded_fraction: 0.0,
            video_muted: false,
            video_playback_quality: String::new(),
            video_playback_rate: 1.0,
            video_title: String::new(),
            video_url: String::new(),
            video_volume: 0,
            heartbeat: HeartbeatState {
                handle: None,
                period: Duration::from_millis(500),
            },
            heartbeat_origin: None,
            milestones: MilestoneState::Pending,
            next_milestone: None,
            last_milestone_time: None,
            previous_event_type: None,
            triggers: TriggerTable::default(),
        }
    }

    pub fn with_triggers(mut self, triggers: TriggerTable) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat.period = period;
        self
    }

    pub fn video_type(&self) -> VideoType {
        if self.is_live_event {
            VideoType::Live
        } else {
            VideoType::VideoOnDemand
        }
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.handle.is_some()
    }

    /// Record the player's values for the next payload
    pub fn refresh(&mut self, player: &dyn PlayerApi) {
        let video_data = player.video_data();
        self.video_current_time = player.current_time();
        self.video_duration = player.duration();
        self.video_id = video_data.video_id;
        self.video_title = video_data.title;
        self.video_loaded_fraction = player.video_loaded_fraction();
        self.video_muted = player.is_muted();
        self.video_playback_quality = player.playback_quality();
        self.video_playback_rate = player.playback_rate();
        self.video_url = strip_time_parameter(&player.video_url());
        self.video_volume = player.volume();
    }

    /// Fix the video type from the duration reported at ready time
    pub fn initialize_at_ready(&mut self, player: &dyn PlayerApi) {
        self.refresh(player);
        self.is_live_event = VideoType::from_ready_duration(self.video_duration) == VideoType::Live;
    }

    /// Compile the milestone table if that has not happened yet
    pub fn compile_milestones_if_pending(&mut self) {
        if !matches!(self.milestones, MilestoneState::Pending) {
            return;
        }
        let requests = self.triggers.take_milestone_requests();
        self.milestones = match compile_milestones(
            &requests,
            self.video_duration,
            self.video_start_time,
            self.is_live_event,
        ) {
            Some(compiled) => MilestoneState::Compiled(compiled),
            None => MilestoneState::Unavailable,
        };
    }

    pub fn compiled_milestones(&self) -> Option<&CompiledMilestones> {
        match &self.milestones {
            MilestoneState::Compiled(compiled) => Some(compiled),
            _ => None,
        }
    }

    /// Point the milestone cursor at the first milestone not yet reached
    pub fn reset_milestone_cursor(&mut self, current_time: f64) {
        self.next_milestone = match &self.milestones {
            MilestoneState::Compiled(compiled) => {
                compiled.cursor_at(current_time, self.last_milestone_time)
            }
            _ => None,
        };
    }

    /// Close the open play segment and add it to the total
    ///
    /// Returns the segment's length; zero when no segment was open.
    pub fn fold_play_segment(&mut self) -> f64 {
        let segment = match self.play_start_time.take() {
            Some(start) => (self.play_stop_time - start).max(0.0),
            None => 0.0,
        };
        self.play_segment_time = segment;
        self.play_total_time += segment;
        segment
    }
}

/// A player instantiated on a registered element
pub struct TrackedPlayer {
    pub element: ElementRef,
    pub player: Box<dyn PlayerApi>,
    pub session: PlayerSession,
    /// Set once the native ready callback has fired
    pub ready: bool,
}

impl TrackedPlayer {
    pub fn new(element: ElementRef, player: Box<dyn PlayerApi>, session: PlayerSession) -> Self {
        Self {
            element,
            player,
            session,
            ready: false,
        }
    }

    pub fn player_id(&self) -> &str {
        &self.session.player_id
    }
}

impl std::fmt::Debug for TrackedPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedPlayer")
            .field("player_id", &self.session.player_id)
            .field("ready", &self.ready)
            .finish()
    }
}
