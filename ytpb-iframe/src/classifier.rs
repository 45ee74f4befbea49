//! Playback event classification and dispatch
//!
//! Every native callback for a ready player, every synthesized removal and every
//! heartbeat tick ends up here. Processing one event runs to completion:
//!
//! 1. Refine `video playing` into started, replayed or resumed
//! 2. Drop a playback event identical to the previous one
//! 3. Start or stop the heartbeat and account for play time
//! 4. Assemble the payload and fire the triggers
//! 5. Update the lifecycle flags, compiling milestones on the first start
//! 6. Move the milestone cursor and catch up on milestones already passed

use tracing::debug;
use ytpb_common::events::{error_message, NativePlayerState};
use ytpb_common::EventType;

use crate::heartbeat::HeartbeatScheduler;
use crate::payload::{VideoEvent, VideoStateData};
use crate::player::NativeEvent;
use crate::session::{MilestoneState, TrackedPlayer};
use crate::triggers::Trigger;

/// Outcome of refining a raw `video playing`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayingClassification {
    pub event_type: EventType,
    /// The platform reports a replay as playing, buffering, playing; the first
    /// playing after an end is held back so the second can be reported as a replay
    pub deferred: bool,
}

impl TrackedPlayer {
    /// Refine a raw `video playing` using the session's history
    pub fn classify_playing(&self) -> PlayingClassification {
        let session = &self.session;
        let triggers = &session.triggers;

        let (event_type, deferred) = if !session.has_started
            && triggers.has_triggers(EventType::VideoStarted)
        {
            (EventType::VideoStarted, false)
        } else if session.has_ended && triggers.has_triggers(EventType::VideoReplayed) {
            (EventType::VideoPlaying, true)
        } else if session.has_replayed && triggers.has_triggers(EventType::VideoReplayed) {
            (EventType::VideoReplayed, false)
        } else if session.has_paused && triggers.has_triggers(EventType::VideoResumed) {
            (EventType::VideoResumed, false)
        } else {
            (EventType::VideoPlaying, false)
        };

        PlayingClassification {
            event_type,
            deferred,
        }
    }

    /// Process one event of `event_type` for this player
    ///
    /// # Returns
    /// Number of trigger invocations.
    pub fn process_event(
        &mut self,
        event_type: EventType,
        native: &NativeEvent,
        heartbeat: &mut dyn HeartbeatScheduler,
    ) -> usize {
        let classification = if event_type == EventType::VideoPlaying {
            self.classify_playing()
        } else {
            PlayingClassification {
                event_type,
                deferred: false,
            }
        };
        let event_type = classification.event_type;

        if event_type.is_playback() && self.session.previous_event_type == Some(event_type) {
            debug!(player_id = %self.session.player_id, "Suppressing duplicate {}", event_type);
            return 0;
        }

        if event_type.is_playing_family() && !self.session.has_started && self.session.is_live_event
        {
            self.session.video_start_time = self.player.current_time().floor();
            debug!(
                player_id = %self.session.player_id,
                "Live video started at {}s", self.session.video_start_time
            );
        }

        let previous = self.session.previous_event_type;
        if event_type.is_playing_family() {
            self.start_heartbeat(native, heartbeat);
        } else if event_type.stops_heartbeat() {
            self.stop_heartbeat(heartbeat);
            let already_stopped = matches!(
                previous,
                Some(EventType::VideoPaused) | Some(EventType::VideoEnded)
            );
            if event_type == EventType::PlayerRemoved && already_stopped {
                self.session.play_start_time = None;
                self.session.play_segment_time = 0.0;
            } else {
                self.session.fold_play_segment();
            }
        }

        let fired = if classification.deferred {
            debug!(
                player_id = %self.session.player_id,
                "Video replaying, reporting on next playing"
            );
            0
        } else {
            let data = self.state_data(event_type, native);
            self.dispatch(event_type, native, data)
        };

        self.update_flags(event_type);

        if event_type.is_playback() {
            self.session.previous_event_type = Some(event_type);
        }

        if event_type.is_playing_family() {
            let current_time = self.session.play_stop_time;
            self.session.reset_milestone_cursor(current_time);
            return fired + self.check_milestones();
        }
        if event_type.stops_heartbeat() {
            self.session.next_milestone = None;
        }

        fired
    }

    /// Sample the playhead and dispatch milestones it has passed
    ///
    /// A tick for a player that is no longer playing stops its heartbeat; the open
    /// play segment stays open until the next stop or start.
    pub fn heartbeat_tick(&mut self, heartbeat: &mut dyn HeartbeatScheduler) -> usize {
        let Some(handle) = self.session.heartbeat.handle else {
            return 0;
        };

        if self.player.player_state() != Some(NativePlayerState::Playing) {
            heartbeat.stop(handle);
            self.session.heartbeat.handle = None;
            debug!(player_id = %self.session.player_id, "Heartbeat stopped, video not playing");
            return 0;
        }

        self.session.play_stop_time = self.player.current_time();
        self.check_milestones()
    }

    /// Dispatch every milestone at or before the last heartbeat sample
    pub fn check_milestones(&mut self) -> usize {
        let session = &mut self.session;
        let due = match &session.milestones {
            MilestoneState::Compiled(compiled) => {
                compiled.take_due(&mut session.next_milestone, session.play_stop_time)
            }
            _ => return 0,
        };
        if due.is_empty() {
            return 0;
        }

        self.session.refresh(self.player.as_ref());
        self.session.video_current_time = self.session.play_stop_time;
        let native = self.session.heartbeat_origin.clone().unwrap_or_else(|| {
            NativeEvent::state_change(self.session.player_id.clone(), NativePlayerState::Playing)
        });

        let mut fired = 0;
        for bucket in due {
            self.session.last_milestone_time = Some(bucket.time);
            for (label, triggers) in &bucket.labels {
                debug!(player_id = %self.session.player_id, "Milestone {} reached", label);
                let mut data = VideoStateData::from_session(&self.session, EventType::VideoMilestone);
                data.video_milestone = Some(label.clone());
                fired += fire(triggers, &VideoEvent::new(native.clone(), data));
            }
        }
        fired
    }

    fn start_heartbeat(&mut self, native: &NativeEvent, heartbeat: &mut dyn HeartbeatScheduler) {
        if self.session.heartbeat_running() {
            return;
        }

        // a heartbeat that stopped itself left its segment open
        if self.session.play_start_time.is_some() {
            self.session.fold_play_segment();
        }

        let current_time = self.player.current_time();
        self.session.play_start_time = Some(current_time);
        self.session.play_stop_time = current_time;
        self.session.heartbeat.handle =
            Some(heartbeat.start(&self.session.player_id, self.session.heartbeat.period));
        self.session.heartbeat_origin = Some(native.clone());
    }

    fn stop_heartbeat(&mut self, heartbeat: &mut dyn HeartbeatScheduler) {
        if let Some(handle) = self.session.heartbeat.handle.take() {
            heartbeat.stop(handle);
        }
    }

    fn state_data(&mut self, event_type: EventType, native: &NativeEvent) -> VideoStateData {
        // a removed player can no longer be asked for its state
        if event_type != EventType::PlayerRemoved {
            self.session.refresh(self.player.as_ref());
        }

        match event_type {
            EventType::VideoEnded => self.session.video_current_time = self.session.video_duration,
            EventType::VideoPaused | EventType::PlayerRemoved => {
                self.session.video_current_time = self.session.play_stop_time
            }
            _ => {}
        }

        let mut data = VideoStateData::from_session(&self.session, event_type);

        match event_type {
            EventType::ApiChanged => {
                let module_names = self.player.module_names();
                if !module_names.is_empty() {
                    data.module_names = Some(module_names.join(","));
                }
            }
            EventType::PlaybackQualityChanged => {
                if let Some(quality) = native.text() {
                    data.video_playback_quality = quality.to_string();
                }
            }
            EventType::PlayerError => {
                data.error_code = native.code();
                data.error_message = native
                    .code()
                    .and_then(error_message)
                    .map(str::to_string);
            }
            _ => {}
        }

        if event_type.reports_played_time() {
            data.video_played_segment_time = Some(self.session.play_segment_time);
            data.video_played_total_time = Some(self.session.play_total_time);
        }

        data
    }

    fn dispatch(&self, event_type: EventType, native: &NativeEvent, data: VideoStateData) -> usize {
        let triggers = &self.session.triggers;
        let Some(registered) = triggers.triggers(event_type) else {
            debug!(player_id = %self.session.player_id, "No triggers for {}", event_type);
            return 0;
        };

        let event = VideoEvent::new(native.clone(), data);
        let mut fired = fire(registered, &event);

        if let Some(additional) = triggers.additional_triggers(event_type) {
            fired += fire(additional, &event.with_player_state(EventType::VideoPlaying));
        }

        debug!(
            player_id = %self.session.player_id,
            "Dispatched {} to {} trigger(s)", event_type, fired
        );
        fired
    }

    fn update_flags(&mut self, event_type: EventType) {
        let session = &mut self.session;

        if event_type == EventType::VideoEnded {
            session.has_ended = true;
        } else if event_type.marks_paused() {
            session.has_paused = true;
        } else if event_type.is_playing_family() {
            if session.has_ended {
                session.has_replayed = true;
            } else if session.has_replayed {
                session.has_replayed = false;
            } else {
                session.compile_milestones_if_pending();
            }
            session.has_started = true;
            session.has_ended = false;
            session.has_paused = false;
        }
    }
}

fn fire(triggers: &[Trigger], event: &VideoEvent) -> usize {
    for trigger in triggers {
        trigger.fire(event);
    }
    triggers.len()
}
