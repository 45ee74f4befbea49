//! # YTPB IFrame Library (ytpb-iframe)
//!
//! Playback tracking for embedded YouTube IFrame players.
//!
//! **Purpose:** Find player elements on a page, instantiate players through the host
//! environment, translate native player callbacks into extension events (started,
//! resumed, replayed, milestones, removed, ...) and deliver them to registered
//! triggers.
//!
//! **Architecture:** A synchronous [`Tracker`] holds all state and is driven either
//! directly (deterministic replays, tests) or through [`TrackerRuntime`], which
//! serializes callbacks, heartbeat ticks and removals on one tokio task.
//!
//! The browser is abstracted behind [`Host`], [`ElementHandle`], [`PlayerApi`],
//! [`RemovalWatcher`] and [`ApiLoader`]; [`sim`] implements them for scripted runs.

pub mod classifier;
pub mod element;
pub mod heartbeat;
pub mod lifecycle;
pub mod loader;
pub mod milestones;
pub mod payload;
pub mod player;
pub mod runtime;
pub mod scenario;
pub mod session;
pub mod sim;
pub mod tracker;
pub mod triggers;

pub use element::{ElementHandle, ElementRef};
pub use heartbeat::{ExternalHeartbeat, HeartbeatHandle, HeartbeatScheduler, TokioHeartbeat};
pub use lifecycle::{NoopWatcher, RemovalWatcher};
pub use loader::ApiLoader;
pub use payload::{VideoEvent, VideoStateData};
pub use player::{NativeEvent, NativeEventKind, PlayerApi};
pub use runtime::{TrackerHandle, TrackerRuntime};
pub use tracker::{Host, Tracker, TrackingSettings};
pub use triggers::{EventSettings, Trigger};
pub use ytpb_common::{Error, EventType, Result};
