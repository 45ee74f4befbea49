//! Scripted playback scenarios
//!
//! A scenario is a TOML document describing a page (origin and player elements),
//! trigger rules and an ordered list of steps. [`run_scenario`] replays it against a
//! [`Tracker`] on the simulation host and returns every dispatched event in order.
//!
//! ```toml
//! [page]
//! origin = "https://example.com"
//!
//! [[players]]
//! id = "hero"
//! src = "https://www.youtube.com/embed/abc"
//! video = { video_id = "abc", title = "Demo", duration = 200.0 }
//!
//! [[rules]]
//! name = "progress"
//! event = "video milestone"
//! settings = { fixedMilestoneAmounts = [25, 50], fixedMilestoneUnit = "percent" }
//!
//! [[steps]]
//! action = "enable"
//!
//! [[steps]]
//! action = "api-ready"
//!
//! [[steps]]
//! action = "ready"
//! player = "hero"
//!
//! [[steps]]
//! action = "state"
//! player = "hero"
//! state = "playing"
//!
//! [[steps]]
//! action = "advance"
//! player = "hero"
//! to = 120.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use ytpb_common::config::TrackerConfig;
use ytpb_common::events::NativePlayerState;
use ytpb_common::{Error, Result};

use crate::element::ElementHandle;
use crate::heartbeat::ExternalHeartbeat;
use crate::lifecycle::NoopWatcher;
use crate::payload::VideoEvent;
use crate::player::{NativeEvent, NativeEventKind, PlayerApi};
use crate::sim::{lock, SimulatedHost, SimulatedPlayer, VideoScript};
use crate::tracker::{Tracker, TrackingSettings};
use crate::triggers::{EventSettings, Trigger};

/// Page the scenario runs on
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PageScript {
    pub origin: String,
    /// The page loaded the player API before tracking was enabled
    pub api_loaded: bool,
}

impl Default for PageScript {
    fn default() -> Self {
        Self {
            origin: "https://example.com".to_string(),
            api_loaded: false,
        }
    }
}

/// Player element on the page
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerScript {
    /// Element id; elements without one get a generated id when registered
    pub id: Option<String>,
    pub src: String,
    #[serde(default)]
    pub video: VideoScript,
}

/// Trigger registration
#[derive(Debug, Clone, Deserialize)]
pub struct RuleScript {
    /// Label attached to events this rule receives
    pub name: Option<String>,
    /// Extension event type, e.g. `video playing`
    pub event: String,
    #[serde(default)]
    pub settings: EventSettings,
}

/// One scripted action
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Step {
    /// "Enable video playback tracking"; defaults to the configured settings
    Enable {
        #[serde(default)]
        settings: Option<TrackingSettings>,
    },
    /// The player API script finished loading
    ApiReady,
    Ready {
        player: String,
    },
    /// Native state change, optionally moving the playhead first
    State {
        player: String,
        state: NativePlayerState,
        #[serde(default)]
        time: Option<f64>,
    },
    /// Move the playhead without a callback
    Seek {
        player: String,
        time: f64,
    },
    /// One heartbeat tick, optionally moving the playhead first
    Tick {
        player: String,
        #[serde(default)]
        time: Option<f64>,
    },
    /// Play forward to `to`, ticking once per heartbeat period while the heartbeat runs
    Advance {
        player: String,
        to: f64,
    },
    Error {
        player: String,
        code: i64,
    },
    Quality {
        player: String,
        quality: String,
    },
    Rate {
        player: String,
        rate: f64,
    },
    ApiChange {
        player: String,
        #[serde(default)]
        modules: Vec<String>,
    },
    AutoplayBlocked {
        player: String,
    },
    /// Detach the element from the page
    Remove {
        player: String,
    },
    /// Assign a new `src` (or remove the attribute)
    Src {
        player: String,
        #[serde(default)]
        src: Option<String>,
    },
    Unload,
}

/// Complete scenario document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub page: PageScript,
    pub players: Vec<PlayerScript>,
    pub rules: Vec<RuleScript>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }
}

/// Event received by a scenario rule
#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    pub rule: String,
    #[serde(flatten)]
    pub event: VideoEvent,
}

/// Replay a scenario and collect dispatched events in order
pub fn run_scenario(scenario: &Scenario, config: TrackerConfig) -> Result<Vec<RecordedEvent>> {
    let host = SimulatedHost::new(&scenario.page.origin);
    host.set_api_ready(scenario.page.api_loaded);
    for player in &scenario.players {
        host.add_player(player.id.as_deref(), &player.src, player.video.clone());
    }

    let period = config.heartbeat_interval().as_secs_f64();
    let heartbeat = ExternalHeartbeat::new();
    let mut tracker = Tracker::new(
        config,
        Box::new(host.clone()),
        Box::new(heartbeat.clone()),
        Box::new(NoopWatcher),
    );

    let recorded: Arc<Mutex<Vec<RecordedEvent>>> = Arc::new(Mutex::new(Vec::new()));
    for (index, rule) in scenario.rules.iter().enumerate() {
        let name = rule
            .name
            .clone()
            .unwrap_or_else(|| format!("rule {}", index + 1));
        let sink = recorded.clone();
        let trigger = Trigger::new(move |event| {
            lock(&sink).push(RecordedEvent {
                rule: name.clone(),
                event: event.clone(),
            })
        });
        tracker.register_event_trigger(&rule.event, &rule.settings, trigger)?;
    }

    let mut replay = Replay {
        tracker: &mut tracker,
        host: &host,
        heartbeat: &heartbeat,
        period,
    };
    for (index, step) in scenario.steps.iter().enumerate() {
        let fired = replay.apply(step)?;
        debug!("Step {} fired {} trigger(s)", index + 1, fired);
    }

    let events = std::mem::take(&mut *lock(&recorded));
    info!(
        "Scenario replayed: {} step(s), {} event(s)",
        scenario.steps.len(),
        events.len()
    );
    Ok(events)
}

struct Replay<'a> {
    tracker: &'a mut Tracker,
    host: &'a SimulatedHost,
    heartbeat: &'a ExternalHeartbeat,
    /// Heartbeat period in seconds
    period: f64,
}

impl Replay<'_> {
    fn player(&self, id: &str) -> Result<SimulatedPlayer> {
        self.host
            .player(id)
            .ok_or_else(|| Error::NotFound(format!("player {}", id)))
    }

    fn apply(&mut self, step: &Step) -> Result<usize> {
        let fired = match step {
            Step::Enable { settings } => {
                let settings = settings
                    .clone()
                    .unwrap_or_else(|| TrackingSettings::from(self.tracker.config()));
                self.tracker.enable_video_playback_tracking(&settings);
                0
            }
            Step::ApiReady => {
                self.tracker.api_ready();
                0
            }
            Step::Ready { player } => self.tracker.handle_native(NativeEvent::ready(player)),
            Step::State {
                player,
                state,
                time,
            } => {
                let simulated = self.player(player)?;
                if let Some(time) = time {
                    simulated.seek(*time);
                }
                simulated.set_state(*state);
                self.tracker
                    .handle_native(NativeEvent::state_change(player, *state))
            }
            Step::Seek { player, time } => {
                self.player(player)?.seek(*time);
                0
            }
            Step::Tick { player, time } => {
                if let Some(time) = time {
                    self.player(player)?.seek(*time);
                }
                self.tracker.heartbeat_tick(player)
            }
            Step::Advance { player, to } => self.advance(player, *to)?,
            Step::Error { player, code } => {
                self.tracker.handle_native(NativeEvent::error(player, *code))
            }
            Step::Quality { player, quality } => {
                self.player(player)?.set_quality(quality);
                self.tracker
                    .handle_native(NativeEvent::playback_quality_change(player, quality.as_str()))
            }
            Step::Rate { player, rate } => {
                self.player(player)?.set_rate(*rate);
                self.tracker
                    .handle_native(NativeEvent::playback_rate_change(player, *rate))
            }
            Step::ApiChange { player, modules } => {
                self.player(player)?.set_module_names(modules.clone());
                self.tracker
                    .handle_native(NativeEvent::new(NativeEventKind::ApiChange, player))
            }
            Step::AutoplayBlocked { player } => self
                .tracker
                .handle_native(NativeEvent::new(NativeEventKind::AutoplayBlocked, player)),
            Step::Remove { player } => {
                self.host.remove_element(player);
                self.tracker.element_removed(player)
            }
            Step::Src { player, src } => {
                if let (Some(element), Some(src)) = (self.host.element(player), src) {
                    element.set_src(src);
                }
                self.tracker.element_src_changed(player, src.as_deref())
            }
            Step::Unload => self.tracker.page_unloaded(),
        };
        Ok(fired)
    }

    fn advance(&mut self, player: &str, to: f64) -> Result<usize> {
        let simulated = self.player(player)?;
        let mut time = simulated.current_time();
        let mut fired = 0;

        while time < to && self.heartbeat.is_running(player) {
            time = (time + self.period).min(to);
            simulated.seek(time);
            fired += self.tracker.heartbeat_tick(player);
        }
        if time < to {
            simulated.seek(to);
        }
        Ok(fired)
    }
}
