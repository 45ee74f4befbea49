//! Deterministic simulation host
//!
//! Scripted stand-ins for the browser: elements matched against CSS selectors,
//! players whose playhead and state are moved by hand, a host that instantiates
//! them, a removal watcher that records subscriptions, a script loader that fails
//! on demand and a trigger that records every event it receives.
//!
//! Every type here is cheap to clone and clones share state, so a test keeps one
//! copy as a remote control while the tracker owns another.

use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use scraper::{ElementRef as HtmlElement, Html, Selector};
use tracing::debug;
use ytpb_common::events::NativePlayerState;
use ytpb_common::{EventType, Error, Result};

use crate::element::{ElementHandle, ElementRef, SetupStatus};
use crate::lifecycle::RemovalWatcher;
use crate::loader::ApiLoader;
use crate::payload::VideoEvent;
use crate::player::{PlayerApi, VideoData};
use crate::tracker::Host;
use crate::triggers::Trigger;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ========================================
// Elements
// ========================================

#[derive(Debug, Default)]
struct ElementState {
    id: Option<String>,
    src: Option<String>,
    classes: Vec<String>,
    containers: Vec<String>,
    setup_status: Option<SetupStatus>,
    src_assignments: usize,
}

/// Page element with a scripted id, `src` and class list
#[derive(Debug)]
pub struct SimulatedElement {
    node_name: String,
    state: Mutex<ElementState>,
}

impl SimulatedElement {
    pub fn new(node_name: &str, id: Option<&str>, src: Option<&str>) -> Self {
        Self {
            node_name: node_name.to_ascii_uppercase(),
            state: Mutex::new(ElementState {
                id: id.map(str::to_string),
                src: src.map(str::to_string),
                ..ElementState::default()
            }),
        }
    }

    pub fn iframe(id: Option<&str>, src: &str) -> Self {
        Self::new("IFRAME", id, Some(src))
    }

    pub fn with_class(self, class: &str) -> Self {
        lock(&self.state).classes.push(class.to_string());
        self
    }

    /// Number of times `src` was assigned since creation
    pub fn src_assignments(&self) -> usize {
        lock(&self.state).src_assignments
    }

    /// Nest the element in a container; the first container added is the outermost
    pub fn inside(self, container: &str) -> Self {
        lock(&self.state).containers.push(container.to_ascii_lowercase());
        self
    }

    /// Markup for the element nested in its containers
    fn markup(&self) -> String {
        let state = lock(&self.state);
        let tag = self.node_name.to_ascii_lowercase();

        let mut attributes = String::new();
        let setup_status = state.setup_status.map(|status| match status {
            SetupStatus::Started => "started",
            SetupStatus::Modified => "modified",
            SetupStatus::Completed => "completed",
        });
        let classes = (!state.classes.is_empty()).then(|| state.classes.join(" "));
        for (name, value) in [
            ("id", state.id.as_deref()),
            ("src", state.src.as_deref()),
            ("class", classes.as_deref()),
            ("data-launchext-setup", setup_status),
        ] {
            if let Some(value) = value {
                attributes.push_str(&format!(" {}=\"{}\"", name, escape_attribute(value)));
            }
        }

        let mut markup = format!("<{}{}></{}>", tag, attributes, tag);
        for container in state.containers.iter().rev() {
            markup = format!("<{0}>{1}</{0}>", container, markup);
        }
        format!("<!DOCTYPE html><html><body>{}</body></html>", markup)
    }
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

impl ElementHandle for SimulatedElement {
    fn node_name(&self) -> String {
        self.node_name.clone()
    }

    fn id(&self) -> Option<String> {
        lock(&self.state).id.clone()
    }

    fn set_id(&self, id: &str) {
        lock(&self.state).id = Some(id.to_string());
    }

    fn src(&self) -> Option<String> {
        lock(&self.state).src.clone()
    }

    fn set_src(&self, src: &str) {
        let mut state = lock(&self.state);
        state.src = Some(src.to_string());
        state.src_assignments += 1;
    }

    fn setup_status(&self) -> Option<SetupStatus> {
        lock(&self.state).setup_status
    }

    fn set_setup_status(&self, status: SetupStatus) {
        lock(&self.state).setup_status = Some(status);
    }

    /// Matches against the element rendered inside its containers; a selector that
    /// does not parse matches nothing
    fn matches(&self, selector: &str) -> bool {
        let selector = match Selector::parse(selector) {
            Ok(selector) => selector,
            Err(e) => {
                debug!("Invalid selector {:?}: {:?}", selector, e);
                return false;
            }
        };

        let document = Html::parse_document(&self.markup());
        // the element is the innermost node of the rendered page
        document
            .root_element()
            .descendants()
            .filter_map(HtmlElement::wrap)
            .last()
            .map_or(false, |element| selector.matches(&element))
    }
}

// ========================================
// Players
// ========================================

/// Video a simulated player plays
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VideoScript {
    pub video_id: String,
    pub title: String,
    /// Seconds; 0 for a live broadcast
    pub duration: f64,
    pub playback_quality: String,
    pub playback_rate: f64,
    pub volume: u32,
    pub muted: bool,
    pub module_names: Vec<String>,
}

impl Default for VideoScript {
    fn default() -> Self {
        Self {
            video_id: String::new(),
            title: String::new(),
            duration: 0.0,
            playback_quality: "hd720".to_string(),
            playback_rate: 1.0,
            volume: 100,
            muted: false,
            module_names: Vec::new(),
        }
    }
}

impl VideoScript {
    pub fn on_demand(video_id: &str, duration: f64) -> Self {
        Self {
            video_id: video_id.to_string(),
            title: format!("Video {}", video_id),
            duration,
            ..Self::default()
        }
    }

    pub fn live(video_id: &str) -> Self {
        Self::on_demand(video_id, 0.0)
    }
}

#[derive(Debug)]
struct PlayerModel {
    script: VideoScript,
    current_time: f64,
    state: Option<NativePlayerState>,
}

/// Player whose state and playhead are set by hand
#[derive(Debug, Clone)]
pub struct SimulatedPlayer {
    model: Arc<Mutex<PlayerModel>>,
}

impl SimulatedPlayer {
    pub fn new(script: VideoScript) -> Self {
        Self {
            model: Arc::new(Mutex::new(PlayerModel {
                script,
                current_time: 0.0,
                state: Some(NativePlayerState::Unstarted),
            })),
        }
    }

    pub fn set_state(&self, state: NativePlayerState) {
        lock(&self.model).state = Some(state);
    }

    pub fn seek(&self, seconds: f64) {
        lock(&self.model).current_time = seconds;
    }

    pub fn set_quality(&self, quality: &str) {
        lock(&self.model).script.playback_quality = quality.to_string();
    }

    pub fn set_rate(&self, rate: f64) {
        lock(&self.model).script.playback_rate = rate;
    }

    pub fn set_module_names(&self, names: Vec<String>) {
        lock(&self.model).script.module_names = names;
    }
}

impl PlayerApi for SimulatedPlayer {
    fn current_time(&self) -> f64 {
        lock(&self.model).current_time
    }

    fn duration(&self) -> f64 {
        lock(&self.model).script.duration
    }

    fn player_state(&self) -> Option<NativePlayerState> {
        lock(&self.model).state
    }

    fn is_muted(&self) -> bool {
        lock(&self.model).script.muted
    }

    fn volume(&self) -> u32 {
        lock(&self.model).script.volume
    }

    fn playback_rate(&self) -> f64 {
        lock(&self.model).script.playback_rate
    }

    fn playback_quality(&self) -> String {
        lock(&self.model).script.playback_quality.clone()
    }

    fn video_loaded_fraction(&self) -> f64 {
        let model = lock(&self.model);
        if model.script.duration > 0.0 {
            (model.current_time / model.script.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn video_data(&self) -> VideoData {
        let model = lock(&self.model);
        VideoData {
            video_id: model.script.video_id.clone(),
            title: model.script.title.clone(),
        }
    }

    /// Watch URL carrying the playhead as `t`, the way the platform reports it
    fn video_url(&self) -> String {
        let model = lock(&self.model);
        let seconds = model.current_time.floor();
        if seconds >= 1.0 {
            format!(
                "https://www.youtube.com/watch?t={}&v={}",
                seconds, model.script.video_id
            )
        } else {
            format!("https://www.youtube.com/watch?v={}", model.script.video_id)
        }
    }

    fn module_names(&self) -> Vec<String> {
        lock(&self.model).script.module_names.clone()
    }
}

// ========================================
// Host
// ========================================

#[derive(Debug, Default)]
struct HostState {
    origin: String,
    api_ready: bool,
    elements: Vec<Arc<SimulatedElement>>,
    /// Scripts keyed by the element id given at `add_player`
    scripts: Vec<(Arc<SimulatedElement>, VideoScript)>,
    players: HashMap<String, SimulatedPlayer>,
}

/// Page holding simulated elements
#[derive(Debug, Clone, Default)]
pub struct SimulatedHost {
    state: Arc<Mutex<HostState>>,
}

impl SimulatedHost {
    pub fn new(origin: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                origin: origin.to_string(),
                ..HostState::default()
            })),
        }
    }

    /// Add an element that plays `script` once a player is created on it
    pub fn add_player(&self, id: Option<&str>, src: &str, script: VideoScript) -> Arc<SimulatedElement> {
        let element = Arc::new(SimulatedElement::iframe(id, src));
        let mut state = lock(&self.state);
        state.elements.push(element.clone());
        state.scripts.push((element.clone(), script));
        element
    }

    /// Add an element no player can be created on
    pub fn add_element(&self, element: SimulatedElement) -> Arc<SimulatedElement> {
        let element = Arc::new(element);
        lock(&self.state).elements.push(element.clone());
        element
    }

    pub fn set_api_ready(&self, ready: bool) {
        lock(&self.state).api_ready = ready;
    }

    /// Element by its current id
    pub fn element(&self, id: &str) -> Option<Arc<SimulatedElement>> {
        lock(&self.state)
            .elements
            .iter()
            .find(|element| element.id().as_deref() == Some(id))
            .cloned()
    }

    /// Detach an element from the page
    pub fn remove_element(&self, id: &str) {
        lock(&self.state)
            .elements
            .retain(|element| element.id().as_deref() != Some(id));
    }

    /// Player created on the element with this id
    pub fn player(&self, id: &str) -> Option<SimulatedPlayer> {
        lock(&self.state).players.get(id).cloned()
    }
}

impl Host for SimulatedHost {
    fn query_selector_all(&self, selector: &str) -> Vec<ElementRef> {
        lock(&self.state)
            .elements
            .iter()
            .filter(|element| element.matches(selector))
            .map(|element| element.clone() as ElementRef)
            .collect()
    }

    fn page_origin(&self) -> String {
        lock(&self.state).origin.clone()
    }

    fn is_api_ready(&self) -> bool {
        lock(&self.state).api_ready
    }

    fn create_player(&mut self, element: &ElementRef) -> Result<Box<dyn PlayerApi>> {
        let id = element
            .id()
            .ok_or_else(|| Error::PlayerSetup("element has no id".to_string()))?;

        let mut state = lock(&self.state);
        let script = state
            .scripts
            .iter()
            .find(|(candidate, _)| candidate.id().as_deref() == Some(id.as_str()))
            .map(|(_, script)| script.clone())
            .ok_or_else(|| Error::PlayerSetup(format!("no video scripted for {}", id)))?;

        let player = SimulatedPlayer::new(script);
        state.players.insert(id, player.clone());
        Ok(Box::new(player))
    }
}

// ========================================
// Removal watcher, loader, recording trigger
// ========================================

/// Removal watcher recording which elements are observed
#[derive(Debug, Clone, Default)]
pub struct RecordingWatcher {
    watched: Arc<Mutex<Vec<String>>>,
}

impl RecordingWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observed element ids, sorted
    pub fn watched(&self) -> Vec<String> {
        let mut watched = lock(&self.watched).clone();
        watched.sort();
        watched
    }
}

impl RemovalWatcher for RecordingWatcher {
    fn watch(&mut self, element: &ElementRef) {
        if let Some(id) = element.id() {
            lock(&self.watched).push(id);
        }
    }

    fn unwatch(&mut self, player_id: &str) {
        lock(&self.watched).retain(|id| id != player_id);
    }
}

/// Script loader that fails a set number of times before succeeding
#[derive(Debug, Clone)]
pub struct SimulatedLoader {
    failures: u32,
    attempts: Arc<AtomicU32>,
}

impl SimulatedLoader {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ApiLoader for SimulatedLoader {
    fn load_script(&self, url: &str) -> BoxFuture<'static, Result<()>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let result = if attempt < self.failures {
            Err(Error::ApiLoad(format!("{} unreachable", url)))
        } else {
            Ok(())
        };
        futures::future::ready(result).boxed()
    }
}

/// Trigger sink recording every event delivered to it
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<VideoEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new trigger that records into this log
    pub fn trigger(&self) -> Trigger {
        let events = self.events.clone();
        Trigger::new(move |event| lock(&events).push(event.clone()))
    }

    pub fn events(&self) -> Vec<VideoEvent> {
        lock(&self.events).clone()
    }

    pub fn event_types(&self) -> Vec<EventType> {
        lock(&self.events)
            .iter()
            .map(VideoEvent::event_type)
            .collect()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| event.event_type() == event_type)
            .count()
    }

    pub fn last(&self, event_type: EventType) -> Option<VideoEvent> {
        lock(&self.events)
            .iter()
            .rev()
            .find(|event| event.event_type() == event_type)
            .cloned()
    }

    /// Milestone labels in dispatch order
    pub fn milestones(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|event| event.youtube.video_milestone.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matching() {
        let element = SimulatedElement::iframe(Some("hero"), "https://www.youtube.com/embed/abc")
            .with_class("featured");

        assert!(element.matches("iframe[src*=youtube]"));
        assert!(element.matches("IFRAME[src*=\"youtube\"]"));
        assert!(element.matches("#hero"));
        assert!(element.matches("iframe.featured"));
        assert!(element.matches("#sidebar, #hero"));
        assert!(element.matches("[src^=https]"));
        assert!(element.matches("*"));

        assert!(!element.matches("div"));
        assert!(!element.matches("iframe[src*=vimeo]"));
        assert!(!element.matches("#sidebar"));
        assert!(!element.matches("iframe.other"));
        assert!(!element.matches("iframe[title]"));
        assert!(!element.matches("main iframe#hero"));
    }

    #[test]
    fn test_descendant_selector_checks_containers() {
        let element = SimulatedElement::iframe(Some("hero"), "https://www.youtube.com/embed/abc")
            .inside("main")
            .inside("section");

        assert!(element.matches("main iframe#hero"));
        assert!(element.matches("main > section > iframe"));
        assert!(!element.matches("main > iframe"));
        assert!(!element.matches("aside iframe"));
        assert!(!element.matches("main"));
    }

    #[test]
    fn test_unparsable_selector_matches_nothing() {
        let element = SimulatedElement::iframe(Some("hero"), "https://www.youtube.com/embed/abc");

        assert!(!element.matches("iframe[src]é"));
        assert!(!element.matches("iframe[[src]"));
        assert!(!element.matches(""));
    }

    #[test]
    fn test_attribute_values_with_quotes() {
        let element = SimulatedElement::iframe(Some("hero"), "https://www.youtube.com/embed/abc?a=\"b\"&c=1");
        assert!(element.matches("iframe[src$='&c=1']"));
        assert!(element.matches("iframe[src*='\"b\"']"));
    }

    #[test]
    fn test_setup_status_attribute_selector() {
        let element = SimulatedElement::iframe(Some("hero"), "https://www.youtube.com/embed/abc");
        assert!(!element.matches("[data-launchext-setup=completed]"));
        element.set_setup_status(SetupStatus::Completed);
        assert!(element.matches("[data-launchext-setup=completed]"));
    }

    #[test]
    fn test_player_url_carries_time_parameter() {
        let player = SimulatedPlayer::new(VideoScript::on_demand("abc", 100.0));
        assert_eq!(player.video_url(), "https://www.youtube.com/watch?v=abc");
        player.seek(42.7);
        assert_eq!(player.video_url(), "https://www.youtube.com/watch?t=42&v=abc");
        assert!((player.video_loaded_fraction() - 0.427).abs() < 1e-9);
    }

    #[test]
    fn test_host_creates_scripted_players_only() {
        let mut host = SimulatedHost::new("https://example.com");
        let hero = host.add_player(Some("hero"), "https://www.youtube.com/embed/abc", VideoScript::on_demand("abc", 10.0));
        let other = host.add_element(SimulatedElement::iframe(Some("other"), "https://www.youtube.com/embed/xyz"));

        assert_eq!(host.query_selector_all("iframe[src*=youtube]").len(), 2);

        let hero: ElementRef = hero;
        assert!(host.create_player(&hero).is_ok());
        assert!(host.player("hero").is_some());

        let other: ElementRef = other;
        assert!(matches!(host.create_player(&other), Err(Error::PlayerSetup(_))));
    }
}
