//! Playback tracking coordinator
//!
//! [`Tracker`] owns every piece of tracking state: trigger registrations, elements
//! waiting for the player API, instantiated players and the heartbeat scheduler.
//! All entry points take `&mut self`, so callers serialize native callbacks,
//! heartbeat ticks and removal notifications; [`crate::runtime::TrackerRuntime`]
//! does this with a single command queue.

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use ytpb_common::config::{deserialize_flag, player_selector, ElementSpecificity, TrackerConfig};
use ytpb_common::{EventType, Result};

use crate::element::{
    register_player_element, required_parameters, ElementRef, SetupStatus, PLAYER_SRC_PATTERN,
};
use crate::heartbeat::{HeartbeatHandle, HeartbeatScheduler};
use crate::lifecycle::{PlayerRegistry, RemovalWatcher};
use crate::player::{NativeEvent, NativeEventKind, PlayerApi};
use crate::session::{PlayerSession, TrackedPlayer};
use crate::triggers::{EventSettings, Trigger, TriggerRegistry};

/// Host environment the tracker runs in
pub trait Host: Send {
    /// Elements matching a CSS selector, in document order
    fn query_selector_all(&self, selector: &str) -> Vec<ElementRef>;

    /// Origin of the embedding page, e.g. `https://example.com`
    fn page_origin(&self) -> String;

    /// Whether the player API script has already been loaded by the page
    fn is_api_ready(&self) -> bool;

    /// Instantiate a player on a registered element
    fn create_player(&mut self, element: &ElementRef) -> Result<Box<dyn PlayerApi>>;
}

/// Settings of the "Enable video playback tracking" action
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackingSettings {
    pub element_specificity: ElementSpecificity,

    /// Selector used when `element_specificity` is `specific`
    pub elements_selector: String,

    /// Load the player API script if the page has not
    #[serde(deserialize_with = "deserialize_flag")]
    pub load_youtube_iframe_api: bool,
}

impl TrackingSettings {
    pub fn selector(&self) -> &str {
        player_selector(self.element_specificity, &self.elements_selector)
    }
}

impl From<&TrackerConfig> for TrackingSettings {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            element_specificity: config.element_specificity,
            elements_selector: config.elements_selector.clone(),
            load_youtube_iframe_api: config.load_youtube_iframe_api,
        }
    }
}

/// Elements an enable call registered and the players it could set up right away
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnableOutcome {
    pub registered: Vec<String>,
    /// Empty while the player API is not ready
    pub created: Vec<String>,
}

/// Result of a readiness check on a newly instantiated player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyCheck {
    Ready,
    /// Not ready yet; check again after the delay
    Retry(Duration),
    /// Never became ready; the player was abandoned
    GaveUp,
    /// No such player
    Unknown,
}

/// Playback tracking coordinator
pub struct Tracker {
    config: TrackerConfig,
    host: Box<dyn Host>,
    heartbeat: Box<dyn HeartbeatScheduler>,
    registry: TriggerRegistry,
    players: PlayerRegistry,
    /// Registered elements waiting for the player API
    pending: Vec<ElementRef>,
    api_ready: bool,
}

impl Tracker {
    pub fn new(
        config: TrackerConfig,
        host: Box<dyn Host>,
        heartbeat: Box<dyn HeartbeatScheduler>,
        watcher: Box<dyn RemovalWatcher>,
    ) -> Self {
        Self {
            config,
            host,
            heartbeat,
            registry: TriggerRegistry::new(),
            players: PlayerRegistry::new(watcher),
            pending: Vec::new(),
            api_ready: false,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Register a trigger for an event type given by its wire string
    ///
    /// Registrations apply to players instantiated afterwards.
    pub fn register_event_trigger(
        &mut self,
        event_type: &str,
        settings: &EventSettings,
        trigger: Trigger,
    ) -> Result<()> {
        let event_type: EventType = event_type.parse()?;
        self.register(event_type, settings, trigger);
        Ok(())
    }

    pub fn register(&mut self, event_type: EventType, settings: &EventSettings, trigger: Trigger) {
        debug!("Registering trigger for {} in scope {}", event_type, settings.scope());
        self.registry.register(event_type, settings, trigger);
    }

    /// Find player elements, prepare them and set up players once the API is ready
    pub fn enable_video_playback_tracking(&mut self, settings: &TrackingSettings) -> EnableOutcome {
        let selector = settings.selector();
        let elements = self.host.query_selector_all(selector);
        if elements.is_empty() {
            debug!("No player elements match {}", selector);
            return EnableOutcome::default();
        }

        let parameters = required_parameters(&self.host.page_origin());
        let mut registered = Vec::new();

        for (index, element) in elements.iter().enumerate() {
            let Some(element) = register_player_element(
                element,
                index,
                &self.config.player_id_prefix,
                PLAYER_SRC_PATTERN,
                &parameters,
            ) else {
                continue;
            };
            let Some(id) = element.id() else {
                continue;
            };
            let already_pending = self
                .pending
                .iter()
                .any(|pending| pending.id().as_deref() == Some(id.as_str()));
            if already_pending || self.players.contains(&id) {
                continue;
            }
            debug!(player_id = %id, "Element registered for tracking");
            self.pending.push(element);
            registered.push(id);
        }

        let created = if self.is_api_ready() {
            self.setup_pending_players()
        } else {
            Vec::new()
        };
        EnableOutcome {
            registered,
            created,
        }
    }

    pub fn is_api_ready(&self) -> bool {
        self.api_ready || self.host.is_api_ready()
    }

    /// The player API script is available: set up every waiting element
    ///
    /// # Returns
    /// Ids of the players instantiated.
    pub fn api_ready(&mut self) -> Vec<String> {
        if !self.api_ready {
            info!("YouTube IFrame API is ready");
        }
        self.api_ready = true;
        self.setup_pending_players()
    }

    /// Instantiate players for waiting elements
    pub fn setup_pending_players(&mut self) -> Vec<String> {
        let mut created = Vec::new();

        for element in std::mem::take(&mut self.pending) {
            let Some(id) = element.id() else {
                continue;
            };
            if self.players.contains(&id) {
                continue;
            }

            let player = match self.host.create_player(&element) {
                Ok(player) => player,
                Err(e) => {
                    error!(player_id = %id, "Unable to create player: {}", e);
                    continue;
                }
            };

            let session = PlayerSession::new(id.clone())
                .with_triggers(self.registry.table_for(element.as_ref()))
                .with_heartbeat_period(self.config.heartbeat_interval());
            self.players
                .insert(TrackedPlayer::new(element, player, session));
            info!(player_id = %id, "Player created");
            created.push(id);
        }

        created
    }

    /// Handle a native player callback
    ///
    /// # Returns
    /// Number of trigger invocations.
    pub fn handle_native(&mut self, event: NativeEvent) -> usize {
        if event.kind == NativeEventKind::Removed {
            return self.element_removed(&event.target);
        }

        let Some(tracked) = self.players.get_mut(&event.target) else {
            debug!(player_id = %event.target, "Ignoring {:?} for untracked player", event.kind);
            return 0;
        };

        if event.kind == NativeEventKind::Ready {
            if tracked.ready {
                debug!(player_id = %event.target, "Player already ready");
                return 0;
            }
            tracked.ready = true;
            tracked.element.set_setup_status(SetupStatus::Completed);
            tracked.session.initialize_at_ready(tracked.player.as_ref());
            info!(player_id = %event.target, "Player ready ({})", tracked.session.video_type());
        } else if !tracked.ready {
            debug!(player_id = %event.target, "Ignoring {:?} before player ready", event.kind);
            return 0;
        }

        let Some(event_type) = event.raw_event_type() else {
            debug!(player_id = %event.target, "Ignoring unknown player state {:?}", event.data);
            return 0;
        };

        tracked.process_event(event_type, &event, self.heartbeat.as_mut())
    }

    /// Heartbeat tick for one player
    pub fn heartbeat_tick(&mut self, player_id: &str) -> usize {
        match self.players.get_mut(player_id) {
            Some(tracked) => tracked.heartbeat_tick(self.heartbeat.as_mut()),
            None => 0,
        }
    }

    /// Heartbeat currently running for a player
    pub fn heartbeat_handle(&self, player_id: &str) -> Option<HeartbeatHandle> {
        self.players
            .get(player_id)
            .and_then(|tracked| tracked.session.heartbeat.handle)
    }

    /// Readiness watchdog step `attempt` (0-based) for a newly created player
    ///
    /// A player that is not ready yet gets its `src` reassigned to force a reload.
    pub fn check_player_ready(&mut self, player_id: &str, attempt: u32) -> ReadyCheck {
        let Some(tracked) = self.players.get(player_id) else {
            return ReadyCheck::Unknown;
        };
        if tracked.ready {
            return ReadyCheck::Ready;
        }

        match self.config.retry.delay_for_attempt(attempt + 1) {
            Some(delay) => {
                warn!(
                    player_id = %player_id,
                    "Player not ready (check {}), reloading; next check in {}ms",
                    attempt + 1,
                    delay.as_millis()
                );
                if let Some(src) = tracked.element.src() {
                    tracked.element.set_src(&src);
                }
                ReadyCheck::Retry(delay)
            }
            None => {
                error!(
                    player_id = %player_id,
                    "Player never became ready after {} checks, abandoning", attempt + 1
                );
                self.players.remove(player_id);
                ReadyCheck::GaveUp
            }
        }
    }

    /// The player's element left the page
    pub fn element_removed(&mut self, player_id: &str) -> usize {
        let Some(mut tracked) = self.players.remove(player_id) else {
            debug!(player_id = %player_id, "Removal of untracked element ignored");
            return 0;
        };

        let fired = if tracked.ready {
            tracked.process_event(
                EventType::PlayerRemoved,
                &NativeEvent::removed(player_id),
                self.heartbeat.as_mut(),
            )
        } else {
            0
        };
        if let Some(handle) = tracked.session.heartbeat.handle.take() {
            self.heartbeat.stop(handle);
        }

        info!(player_id = %player_id, "Player removed");
        fired
    }

    /// The player's element `src` changed
    ///
    /// Navigating away from a player URL counts as a removal.
    pub fn element_src_changed(&mut self, player_id: &str, src: Option<&str>) -> usize {
        match src {
            Some(src) if src.contains(PLAYER_SRC_PATTERN) => 0,
            _ => self.element_removed(player_id),
        }
    }

    /// The page is unloading: every player is removed
    pub fn page_unloaded(&mut self) -> usize {
        self.players
            .ids()
            .iter()
            .map(|player_id| self.element_removed(player_id))
            .sum()
    }

    /// Stop every heartbeat
    pub fn shutdown(&mut self) {
        self.heartbeat.stop_all();
        for tracked in self.players.iter_mut() {
            tracked.session.heartbeat.handle = None;
        }
    }

    pub fn player_ids(&self) -> Vec<String> {
        self.players.ids()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn session(&self, player_id: &str) -> Option<&PlayerSession> {
        self.players.get(player_id).map(|tracked| &tracked.session)
    }

    pub fn is_ready(&self, player_id: &str) -> bool {
        self.players
            .get(player_id)
            .map_or(false, |tracked| tracked.ready)
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("players", &self.players)
            .field("pending", &self.pending.len())
            .field("api_ready", &self.api_ready)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementHandle;
    use crate::heartbeat::ExternalHeartbeat;
    use crate::sim::{EventLog, RecordingWatcher, SimulatedHost, VideoScript};
    use ytpb_common::events::NativePlayerState;

    fn tracker_with(host: &SimulatedHost, watcher: &RecordingWatcher) -> Tracker {
        Tracker::new(
            TrackerConfig::default(),
            Box::new(host.clone()),
            Box::new(ExternalHeartbeat::new()),
            Box::new(watcher.clone()),
        )
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let host = SimulatedHost::new("https://example.com");
        let mut tracker = tracker_with(&host, &RecordingWatcher::new());
        let err = tracker
            .register_event_trigger("video exploded", &EventSettings::default(), Trigger::new(|_| {}))
            .unwrap_err();
        assert!(matches!(err, ytpb_common::Error::UnknownEventType(_)));
    }

    #[test]
    fn test_enable_waits_for_api() {
        let host = SimulatedHost::new("https://example.com");
        host.add_player(Some("hero"), "https://www.youtube.com/embed/abc", VideoScript::on_demand("abc", 100.0));
        let watcher = RecordingWatcher::new();
        let mut tracker = tracker_with(&host, &watcher);

        let outcome = tracker.enable_video_playback_tracking(&TrackingSettings::default());
        assert_eq!(outcome.registered, vec!["hero".to_string()]);
        assert!(outcome.created.is_empty());
        assert_eq!(tracker.pending_count(), 1);
        assert!(tracker.player_ids().is_empty());

        assert_eq!(tracker.api_ready(), vec!["hero".to_string()]);
        assert_eq!(tracker.player_ids(), vec!["hero".to_string()]);
        assert_eq!(watcher.watched(), vec!["hero".to_string()]);

        // enabling again does not set the player up twice
        assert_eq!(
            tracker.enable_video_playback_tracking(&TrackingSettings::default()),
            EnableOutcome::default()
        );
    }

    #[test]
    fn test_enable_with_api_already_loaded() {
        let host = SimulatedHost::new("https://example.com");
        host.set_api_ready(true);
        host.add_player(None, "https://www.youtube.com/embed/abc", VideoScript::on_demand("abc", 100.0));
        let mut tracker = tracker_with(&host, &RecordingWatcher::new());

        let outcome = tracker.enable_video_playback_tracking(&TrackingSettings::default());
        assert_eq!(outcome.registered.len(), 1);
        assert!(outcome.registered[0].starts_with("youTubePlayback_"));
        assert_eq!(outcome.created, outcome.registered);
        assert_eq!(tracker.player_ids(), outcome.created);
    }

    #[test]
    fn test_no_matching_elements() {
        let host = SimulatedHost::new("https://example.com");
        let mut tracker = tracker_with(&host, &RecordingWatcher::new());
        assert_eq!(
            tracker.enable_video_playback_tracking(&TrackingSettings::default()),
            EnableOutcome::default()
        );
    }

    #[test]
    fn test_events_before_ready_are_ignored() {
        let host = SimulatedHost::new("https://example.com");
        host.set_api_ready(true);
        host.add_player(Some("hero"), "https://www.youtube.com/embed/abc", VideoScript::on_demand("abc", 100.0));
        let mut tracker = tracker_with(&host, &RecordingWatcher::new());
        let log = EventLog::new();
        tracker.register(EventType::VideoPlaying, &EventSettings::default(), log.trigger());
        tracker.register(EventType::PlayerReady, &EventSettings::default(), log.trigger());
        tracker.enable_video_playback_tracking(&TrackingSettings::default());

        assert_eq!(
            tracker.handle_native(NativeEvent::state_change("hero", NativePlayerState::Playing)),
            0
        );
        assert_eq!(tracker.handle_native(NativeEvent::ready("hero")), 1);
        assert!(tracker.is_ready("hero"));
        assert_eq!(
            host.element("hero").unwrap().setup_status(),
            Some(SetupStatus::Completed)
        );
        assert_eq!(log.event_types(), vec![EventType::PlayerReady]);
    }

    #[test]
    fn test_readiness_watchdog_gives_up() {
        let host = SimulatedHost::new("https://example.com");
        host.set_api_ready(true);
        host.add_player(Some("hero"), "https://www.youtube.com/embed/abc", VideoScript::on_demand("abc", 100.0));
        let mut tracker = tracker_with(&host, &RecordingWatcher::new());
        tracker.enable_video_playback_tracking(&TrackingSettings::default());
        let assignments = host.element("hero").unwrap().src_assignments();

        let checks: Vec<ReadyCheck> = (0..5).map(|attempt| tracker.check_player_ready("hero", attempt)).collect();
        assert_eq!(
            checks,
            vec![
                ReadyCheck::Retry(Duration::from_secs(2)),
                ReadyCheck::Retry(Duration::from_secs(4)),
                ReadyCheck::Retry(Duration::from_secs(8)),
                ReadyCheck::Retry(Duration::from_secs(16)),
                ReadyCheck::GaveUp,
            ]
        );
        assert!(tracker.player_ids().is_empty());
        assert_eq!(tracker.check_player_ready("hero", 0), ReadyCheck::Unknown);
        assert_eq!(
            host.element("hero").unwrap().src_assignments(),
            assignments + 4
        );
    }

    #[test]
    fn test_src_change_away_from_player_removes() {
        let host = SimulatedHost::new("https://example.com");
        host.set_api_ready(true);
        host.add_player(Some("hero"), "https://www.youtube.com/embed/abc", VideoScript::on_demand("abc", 100.0));
        let mut tracker = tracker_with(&host, &RecordingWatcher::new());
        let log = EventLog::new();
        tracker.register(EventType::PlayerRemoved, &EventSettings::default(), log.trigger());
        tracker.enable_video_playback_tracking(&TrackingSettings::default());
        tracker.handle_native(NativeEvent::ready("hero"));

        assert_eq!(
            tracker.element_src_changed("hero", Some("https://www.youtube.com/embed/xyz")),
            0
        );
        assert_eq!(
            tracker.element_src_changed("hero", Some("https://player.vimeo.com/video/1")),
            1
        );
        assert!(tracker.player_ids().is_empty());
        assert_eq!(log.event_types(), vec![EventType::PlayerRemoved]);
    }
}
