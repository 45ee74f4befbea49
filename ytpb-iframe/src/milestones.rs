//! Milestone compilation and lookahead
//!
//! Milestone requests (`25%`, `10s`, ...) are compiled once per player, when the
//! video first starts and its duration is known, into buckets keyed by floored
//! video time. A cursor into the sorted bucket times lets each heartbeat find the
//! milestones it has just crossed without scanning the whole table.
//!
//! **Lookahead:**
//! - The cursor points at the next bucket not yet reached in the current pass
//! - Each tick dispatches every bucket whose time is at or before the sampled
//!   playhead, in ascending order, then moves past them
//! - After a seek backwards past the last reached milestone a new pass begins

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use ytpb_common::time::{floored_video_time, video_time_from_fraction};
use ytpb_common::Error;

use crate::triggers::Trigger;

/// Unit of a milestone amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneUnit {
    Percent,
    Seconds,
}

impl MilestoneUnit {
    /// Suffix used in milestone labels
    pub fn abbreviation(&self) -> &'static str {
        match self {
            MilestoneUnit::Percent => "%",
            MilestoneUnit::Seconds => "s",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneUnit::Percent => "percent",
            MilestoneUnit::Seconds => "seconds",
        }
    }
}

impl fmt::Display for MilestoneUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MilestoneUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percent" => Ok(MilestoneUnit::Percent),
            "seconds" => Ok(MilestoneUnit::Seconds),
            other => Err(Error::InvalidInput(format!(
                "unknown milestone unit: {:?}",
                other
            ))),
        }
    }
}

/// Milestone type; only fixed points in playback are supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneKind {
    #[default]
    Fixed,
}

/// A configured point in playback
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub amount: f64,
    pub unit: MilestoneUnit,
    #[serde(rename = "type", default)]
    pub kind: MilestoneKind,
}

impl Milestone {
    pub fn fixed(amount: f64, unit: MilestoneUnit) -> Self {
        Self {
            amount,
            unit,
            kind: MilestoneKind::Fixed,
        }
    }

    /// Amount followed by the unit abbreviation, e.g. `25%` or `10s`
    pub fn label(&self) -> String {
        format!("{}{}", self.amount, self.unit.abbreviation())
    }
}

/// A milestone together with the trigger it fires
#[derive(Debug, Clone)]
pub struct MilestoneRequest {
    pub milestone: Milestone,
    pub trigger: Trigger,
}

/// Every label reached at one floored video time
#[derive(Debug, Clone)]
pub struct MilestoneBucket {
    /// Video time in seconds, quantized to 0.5s
    pub time: f64,

    /// Labels in the order they were first requested, each with its triggers
    pub labels: Vec<(String, Vec<Trigger>)>,
}

impl MilestoneBucket {
    /// Triggers registered under `label`
    pub fn triggers(&self, label: &str) -> Option<&[Trigger]> {
        self.labels
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, triggers)| triggers.as_slice())
    }

    fn push(&mut self, label: String, trigger: Trigger) {
        match self.labels.iter_mut().find(|(l, _)| *l == label) {
            Some((_, triggers)) => triggers.push(trigger),
            None => self.labels.push((label, vec![trigger])),
        }
    }
}

/// Position of the next unreached milestone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MilestoneCursor {
    /// Index into [`CompiledMilestones::times`]
    pub index: usize,
    pub time: f64,
}

/// Milestone table for one player
#[derive(Debug, Clone, Default)]
pub struct CompiledMilestones {
    /// Buckets keyed by their time rendered as a string (`"100"`, `"174.5"`)
    buckets: HashMap<String, MilestoneBucket>,

    /// Distinct bucket times, ascending
    times: Vec<f64>,
}

/// Key of the bucket at `seconds`
pub fn milestone_key(seconds: f64) -> String {
    format!("{}", seconds)
}

/// Compile milestone requests into a lookup table
///
/// **Algorithm:**
/// 1. Skip percent milestones for live broadcasts, which have no fixed duration
/// 2. Convert percent amounts to floored seconds of `video_duration`
/// 3. Offset live milestones by `video_start_time`
/// 4. Group triggers by time, then by label
///
/// # Returns
/// `None` when no request yields a milestone.
pub fn compile_milestones(
    requests: &[MilestoneRequest],
    video_duration: f64,
    video_start_time: f64,
    is_live_event: bool,
) -> Option<CompiledMilestones> {
    let mut compiled = CompiledMilestones::default();

    for request in requests {
        let milestone = &request.milestone;
        if !milestone.amount.is_finite() {
            continue;
        }

        let mut seconds = match milestone.unit {
            MilestoneUnit::Percent if is_live_event => continue,
            MilestoneUnit::Percent => {
                video_time_from_fraction(video_duration, milestone.amount / 100.0)
            }
            MilestoneUnit::Seconds => milestone.amount,
        };
        if is_live_event {
            seconds += video_start_time;
        }

        compiled
            .buckets
            .entry(milestone_key(seconds))
            .or_insert_with(|| MilestoneBucket {
                time: seconds,
                labels: Vec::new(),
            })
            .push(milestone.label(), request.trigger.clone());
    }

    if compiled.buckets.is_empty() {
        return None;
    }

    compiled.times = compiled.buckets.values().map(|bucket| bucket.time).collect();
    compiled.times.sort_by(|a, b| a.total_cmp(b));
    compiled.times.dedup();
    Some(compiled)
}

impl CompiledMilestones {
    /// Bucket at exactly `seconds`
    pub fn bucket(&self, seconds: f64) -> Option<&MilestoneBucket> {
        self.buckets.get(&milestone_key(seconds))
    }

    /// Bucket by its string key
    pub fn bucket_by_key(&self, key: &str) -> Option<&MilestoneBucket> {
        self.buckets.get(key)
    }

    /// Distinct milestone times, ascending
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Cursor at the first milestone at or after the floored `current_time`
    ///
    /// Milestones up to `last_reached` were already dispatched in this pass and are
    /// skipped unless the playhead has moved back before them.
    pub fn cursor_at(&self, current_time: f64, last_reached: Option<f64>) -> Option<MilestoneCursor> {
        let start = floored_video_time(current_time);
        let floor = match last_reached {
            Some(reached) if reached <= start => Some(reached),
            _ => None,
        };

        self.times
            .iter()
            .enumerate()
            .find(|&(_, &time)| time >= start && floor.map_or(true, |reached| time > reached))
            .map(|(index, &time)| MilestoneCursor { index, time })
    }

    /// Take every bucket at or before `play_time`, advancing `cursor` past them
    ///
    /// Buckets come back in ascending time order. The cursor becomes `None` once the
    /// last milestone has been taken.
    pub fn take_due(
        &self,
        cursor: &mut Option<MilestoneCursor>,
        play_time: f64,
    ) -> Vec<MilestoneBucket> {
        let mut due = Vec::new();

        while let Some(current) = *cursor {
            if current.time > play_time {
                break;
            }
            if let Some(bucket) = self.bucket(current.time) {
                due.push(bucket.clone());
            }
            let next = current.index + 1;
            *cursor = self.times.get(next).map(|&time| MilestoneCursor { index: next, time });
        }

        due
    }
}
