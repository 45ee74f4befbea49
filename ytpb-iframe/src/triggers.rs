//! Trigger registration and per-player trigger tables
//!
//! Rules register triggers against an event type, grouped under the selector that
//! scopes them to particular player elements. When a player is instantiated the
//! scopes whose selector matches its element are merged into that player's
//! [`TriggerTable`].

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use ytpb_common::config::deserialize_flag;
use ytpb_common::EventType;

use crate::element::ElementHandle;
use crate::milestones::{Milestone, MilestoneRequest, MilestoneUnit};
use crate::payload::VideoEvent;

/// Scope key of triggers that apply to every player
pub const CATCH_ALL_SELECTOR: &str = "*";

/// Callback invoked with an assembled event payload
pub type TriggerFn = dyn Fn(&VideoEvent) + Send + Sync;

/// Identity of one registration
///
/// Valid while the trigger it was taken from is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerId(usize);

/// A registered trigger callback
///
/// Clones share the callback allocation, which is the trigger's identity, so a
/// registration fanned out to several event types can still be recognized as one.
#[derive(Clone)]
pub struct Trigger {
    callback: Arc<TriggerFn>,
}

impl Trigger {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&VideoEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    pub fn id(&self) -> TriggerId {
        TriggerId(Arc::as_ptr(&self.callback).cast::<()>() as usize)
    }

    pub fn fire(&self, event: &VideoEvent) {
        (self.callback)(event)
    }
}

impl PartialEq for Trigger {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Trigger").field(&self.id().0).finish()
    }
}

/// Rule settings accompanying a trigger registration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventSettings {
    /// Selector restricting the rule to matching player elements
    pub matching_selector: Option<String>,

    #[serde(deserialize_with = "deserialize_flag")]
    pub track_started: bool,

    #[serde(deserialize_with = "deserialize_flag")]
    pub track_replayed: bool,

    #[serde(deserialize_with = "deserialize_flag")]
    pub track_resumed: bool,

    /// Do not fire on plain `video playing`
    #[serde(deserialize_with = "deserialize_flag")]
    pub do_not_track: bool,

    /// Amounts of fixed milestones; non-numeric entries are ignored
    pub fixed_milestone_amounts: Vec<serde_json::Value>,

    /// `percent` or `seconds`
    pub fixed_milestone_unit: Option<String>,
}

impl EventSettings {
    /// Scope key, falling back to the catch-all scope
    pub fn scope(&self) -> &str {
        self.matching_selector
            .as_deref()
            .map(str::trim)
            .filter(|selector| !selector.is_empty())
            .unwrap_or(CATCH_ALL_SELECTOR)
    }

    /// Event types a `video playing` registration fans out to
    pub fn playing_event_types(&self) -> Vec<EventType> {
        let mut types = Vec::new();
        if self.track_started {
            types.push(EventType::VideoStarted);
        }
        if self.track_replayed {
            types.push(EventType::VideoReplayed);
        }
        if self.track_resumed {
            types.push(EventType::VideoResumed);
        }
        if !self.do_not_track {
            types.push(EventType::VideoPlaying);
        }
        types
    }

    /// Milestones configured by these settings
    pub fn milestones(&self) -> Vec<Milestone> {
        let unit = match self
            .fixed_milestone_unit
            .as_deref()
            .map(str::parse::<MilestoneUnit>)
        {
            Some(Ok(unit)) => unit,
            Some(Err(e)) => {
                debug!("Ignoring milestones: {}", e);
                return Vec::new();
            }
            None => return Vec::new(),
        };

        self.fixed_milestone_amounts
            .iter()
            .filter_map(serde_json::Value::as_f64)
            .filter(|amount| amount.is_finite())
            .map(|amount| Milestone::fixed(amount, unit))
            .collect()
    }
}

/// Triggers registered under one matching selector
#[derive(Debug, Clone, Default)]
struct Scope {
    selector: String,
    by_type: HashMap<EventType, Vec<Trigger>>,
    milestones: Vec<MilestoneRequest>,
}

/// Every registration made so far, grouped by matching selector
#[derive(Debug, Default)]
pub struct TriggerRegistry {
    scopes: Vec<Scope>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `trigger` for `event_type`
    ///
    /// `video playing` registrations fan out to the synthetic playing types the
    /// settings ask for; `video milestone` registrations become one request per
    /// configured amount.
    pub fn register(&mut self, event_type: EventType, settings: &EventSettings, trigger: Trigger) {
        let scope = self.scope_mut(settings.scope());

        match event_type {
            EventType::VideoPlaying => {
                for event_type in settings.playing_event_types() {
                    scope
                        .by_type
                        .entry(event_type)
                        .or_default()
                        .push(trigger.clone());
                }
            }
            EventType::VideoMilestone => {
                let milestones = settings.milestones();
                if milestones.is_empty() {
                    debug!("Milestone trigger registered without valid milestones");
                }
                scope
                    .milestones
                    .extend(milestones.into_iter().map(|milestone| MilestoneRequest {
                        milestone,
                        trigger: trigger.clone(),
                    }));
            }
            other => scope.by_type.entry(other).or_default().push(trigger),
        }
    }

    /// Selectors that have registrations, in registration order
    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(|scope| scope.selector.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Merge every scope that applies to `element` into one table
    pub fn table_for(&self, element: &dyn ElementHandle) -> TriggerTable {
        let mut table = TriggerTable::default();

        for scope in &self.scopes {
            if scope.selector != CATCH_ALL_SELECTOR && !element.matches(&scope.selector) {
                continue;
            }
            for (event_type, triggers) in &scope.by_type {
                table
                    .by_type
                    .entry(*event_type)
                    .or_default()
                    .extend(triggers.iter().cloned());
            }
            table.milestones.extend(scope.milestones.iter().cloned());
        }

        table.build_additional();
        table
    }

    fn scope_mut(&mut self, selector: &str) -> &mut Scope {
        let index = match self.scopes.iter().position(|scope| scope.selector == selector) {
            Some(index) => index,
            None => {
                self.scopes.push(Scope {
                    selector: selector.to_string(),
                    ..Scope::default()
                });
                self.scopes.len() - 1
            }
        };
        &mut self.scopes[index]
    }
}

/// Triggers that apply to one player
#[derive(Debug, Clone, Default)]
pub struct TriggerTable {
    by_type: HashMap<EventType, Vec<Trigger>>,

    /// Milestone requests, compiled once the video starts
    milestones: Vec<MilestoneRequest>,

    /// Plain `video playing` triggers that also fire when playing is refined to a
    /// synthetic type they were not registered for
    additional: HashMap<EventType, Vec<Trigger>>,
}

impl TriggerTable {
    /// Triggers for `event_type`, `None` when nothing is registered
    pub fn triggers(&self, event_type: EventType) -> Option<&[Trigger]> {
        self.by_type
            .get(&event_type)
            .filter(|triggers| !triggers.is_empty())
            .map(Vec::as_slice)
    }

    pub fn has_triggers(&self, event_type: EventType) -> bool {
        self.triggers(event_type).is_some()
    }

    /// Plain playing triggers to fire alongside a synthetic playing type
    pub fn additional_triggers(&self, event_type: EventType) -> Option<&[Trigger]> {
        self.additional
            .get(&event_type)
            .filter(|triggers| !triggers.is_empty())
            .map(Vec::as_slice)
    }

    pub fn milestone_requests(&self) -> &[MilestoneRequest] {
        &self.milestones
    }

    pub fn has_milestones(&self) -> bool {
        !self.milestones.is_empty()
    }

    /// Hand the milestone requests over for compilation
    pub fn take_milestone_requests(&mut self) -> Vec<MilestoneRequest> {
        std::mem::take(&mut self.milestones)
    }

    fn build_additional(&mut self) {
        self.additional.clear();
        let Some(playing) = self.by_type.get(&EventType::VideoPlaying) else {
            return;
        };

        for refinement in EventType::PLAYING_REFINEMENTS {
            let Some(refined) = self.by_type.get(&refinement).filter(|t| !t.is_empty()) else {
                continue;
            };
            let extra: Vec<Trigger> = playing
                .iter()
                .filter(|trigger| !refined.contains(trigger))
                .cloned()
                .collect();
            if !extra.is_empty() {
                self.additional.insert(refinement, extra);
            }
        }
    }
}
