//! Async runtime driver
//!
//! [`TrackerRuntime`] owns the [`Tracker`] and drains one command queue in a single
//! task. Native callbacks, heartbeat ticks, removal notifications and readiness
//! checks all arrive as [`Command`]s, so for any player they are processed strictly
//! in delivery order and never concurrently.
//!
//! Background tasks (script loading, readiness checks, heartbeats) only enqueue
//! commands; they are aborted on shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use ytpb_common::config::TrackerConfig;
use ytpb_common::{Error, Result};

use crate::heartbeat::{HeartbeatHandle, TokioHeartbeat};
use crate::lifecycle::RemovalWatcher;
use crate::loader::{load_with_retry, ApiLoader};
use crate::player::NativeEvent;
use crate::session::PlayerSession;
use crate::tracker::{Host, ReadyCheck, Tracker, TrackingSettings};
use crate::triggers::{EventSettings, Trigger};

/// Work for the tracker task
#[derive(Debug)]
pub enum Command {
    /// Native player callback
    Native(NativeEvent),

    /// Heartbeat tick; ignored unless `handle` is the player's running heartbeat
    Heartbeat {
        player_id: String,
        handle: HeartbeatHandle,
    },

    RegisterTrigger {
        event_type: String,
        settings: EventSettings,
        trigger: Trigger,
        reply: oneshot::Sender<Result<()>>,
    },

    /// "Enable video playback tracking" action
    Enable(TrackingSettings),

    /// "Load YouTube IFrame API script" action
    LoadApiScript,

    /// The player API script finished loading
    ApiReady,

    /// Readiness watchdog step for a newly created player
    CheckReady { player_id: String, attempt: u32 },

    ElementRemoved(String),

    SrcChanged {
        player_id: String,
        src: Option<String>,
    },

    PageUnloaded,

    /// Snapshot of one player's session
    Session {
        player_id: String,
        reply: oneshot::Sender<Option<PlayerSession>>,
    },

    PlayerIds(oneshot::Sender<Vec<String>>),

    Shutdown,
}

/// Cloneable sender side of the tracker's command queue
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl TrackerHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Internal("tracker runtime has stopped".to_string()))
    }

    pub fn native(&self, event: NativeEvent) -> Result<()> {
        self.send(Command::Native(event))
    }

    pub async fn register_event_trigger(
        &self,
        event_type: &str,
        settings: EventSettings,
        trigger: Trigger,
    ) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::RegisterTrigger {
            event_type: event_type.to_string(),
            settings,
            trigger,
            reply,
        })?;
        response
            .await
            .map_err(|_| Error::Internal("tracker runtime dropped the request".to_string()))?
    }

    pub fn enable_video_playback_tracking(&self, settings: TrackingSettings) -> Result<()> {
        self.send(Command::Enable(settings))
    }

    pub fn load_youtube_iframe_api_script(&self) -> Result<()> {
        self.send(Command::LoadApiScript)
    }

    pub fn api_ready(&self) -> Result<()> {
        self.send(Command::ApiReady)
    }

    pub fn element_removed(&self, player_id: &str) -> Result<()> {
        self.send(Command::ElementRemoved(player_id.to_string()))
    }

    pub fn element_src_changed(&self, player_id: &str, src: Option<&str>) -> Result<()> {
        self.send(Command::SrcChanged {
            player_id: player_id.to_string(),
            src: src.map(str::to_string),
        })
    }

    pub fn page_unloaded(&self) -> Result<()> {
        self.send(Command::PageUnloaded)
    }

    pub async fn session(&self, player_id: &str) -> Result<Option<PlayerSession>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Session {
            player_id: player_id.to_string(),
            reply,
        })?;
        response
            .await
            .map_err(|_| Error::Internal("tracker runtime dropped the request".to_string()))
    }

    pub async fn player_ids(&self) -> Result<Vec<String>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::PlayerIds(reply))?;
        response
            .await
            .map_err(|_| Error::Internal("tracker runtime dropped the request".to_string()))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}

/// Owner of the tracker and its background tasks
pub struct TrackerRuntime {
    tracker: Tracker,
    commands: mpsc::UnboundedReceiver<Command>,
    sender: mpsc::UnboundedSender<Command>,
    loader: Option<Arc<dyn ApiLoader>>,
    loading: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl TrackerRuntime {
    /// Build a runtime whose heartbeats are tokio interval tasks
    pub fn new(
        config: TrackerConfig,
        host: Box<dyn Host>,
        watcher: Box<dyn RemovalWatcher>,
        loader: Option<Arc<dyn ApiLoader>>,
    ) -> (Self, TrackerHandle) {
        let (sender, commands) = mpsc::unbounded_channel();
        let heartbeat = TokioHeartbeat::new(sender.clone());
        let tracker = Tracker::new(config, host, Box::new(heartbeat), watcher);

        let handle = TrackerHandle {
            commands: sender.clone(),
        };
        let runtime = Self {
            tracker,
            commands,
            sender,
            loader,
            loading: None,
            tasks: Vec::new(),
        };
        (runtime, handle)
    }

    /// Spawn the runtime onto the current tokio runtime
    pub fn spawn(
        config: TrackerConfig,
        host: Box<dyn Host>,
        watcher: Box<dyn RemovalWatcher>,
        loader: Option<Arc<dyn ApiLoader>>,
    ) -> (TrackerHandle, JoinHandle<()>) {
        let (runtime, handle) = Self::new(config, host, watcher, loader);
        (handle, tokio::spawn(runtime.run()))
    }

    /// Process commands until shutdown
    pub async fn run(mut self) {
        info!("Tracker runtime started");

        if self.tracker.config().auto_enable {
            warn!(
                "auto_enable is deprecated: use the \"Enable video playback tracking\" action instead"
            );
            let settings = TrackingSettings::from(self.tracker.config());
            self.enable(settings);
        }

        while let Some(command) = self.commands.recv().await {
            if matches!(command, Command::Shutdown) {
                break;
            }
            self.handle(command);
        }

        self.shutdown();
        info!("Tracker runtime stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Native(event) => {
                self.tracker.handle_native(event);
            }
            Command::Heartbeat { player_id, handle } => {
                if self.tracker.heartbeat_handle(&player_id) == Some(handle) {
                    self.tracker.heartbeat_tick(&player_id);
                } else {
                    debug!(player_id = %player_id, "Dropping stale heartbeat tick");
                }
            }
            Command::RegisterTrigger {
                event_type,
                settings,
                trigger,
                reply,
            } => {
                let result = self
                    .tracker
                    .register_event_trigger(&event_type, &settings, trigger);
                if let Err(e) = &result {
                    warn!("Trigger not registered: {}", e);
                }
                let _ = reply.send(result);
            }
            Command::Enable(settings) => self.enable(settings),
            Command::LoadApiScript => self.load_api_script(),
            Command::ApiReady => {
                self.loading = None;
                let created = self.tracker.api_ready();
                self.watch_readiness(created);
            }
            Command::CheckReady { player_id, attempt } => {
                if let ReadyCheck::Retry(delay) = self.tracker.check_player_ready(&player_id, attempt)
                {
                    self.schedule_ready_check(player_id, attempt + 1, delay);
                }
            }
            Command::ElementRemoved(player_id) => {
                self.tracker.element_removed(&player_id);
            }
            Command::SrcChanged { player_id, src } => {
                self.tracker.element_src_changed(&player_id, src.as_deref());
            }
            Command::PageUnloaded => {
                self.tracker.page_unloaded();
            }
            Command::Session { player_id, reply } => {
                let _ = reply.send(self.tracker.session(&player_id).cloned());
            }
            Command::PlayerIds(reply) => {
                let _ = reply.send(self.tracker.player_ids());
            }
            Command::Shutdown => {}
        }
    }

    fn enable(&mut self, settings: TrackingSettings) {
        let outcome = self.tracker.enable_video_playback_tracking(&settings);
        self.watch_readiness(outcome.created);

        if !outcome.registered.is_empty()
            && settings.load_youtube_iframe_api
            && !self.tracker.is_api_ready()
        {
            self.load_api_script();
        }
    }

    fn load_api_script(&mut self) {
        if self.tracker.is_api_ready() {
            debug!("YouTube IFrame API already loaded");
            return;
        }
        if self.loading.as_ref().map_or(false, |task| !task.is_finished()) {
            debug!("YouTube IFrame API script is already loading");
            return;
        }
        let Some(loader) = self.loader.clone() else {
            warn!("No script loader available; waiting for the page to load the YouTube IFrame API");
            return;
        };

        let url = self.tracker.config().youtube_iframe_api_url.clone();
        let retry = self.tracker.config().retry;
        let sender = self.sender.clone();

        self.loading = Some(tokio::spawn(async move {
            if load_with_retry(loader.as_ref(), &url, retry).await.is_ok() {
                let _ = sender.send(Command::ApiReady);
            }
        }));
    }

    fn watch_readiness(&mut self, created: Vec<String>) {
        let Some(first_delay) = self.tracker.config().retry.delay_for_attempt(0) else {
            return;
        };
        for player_id in created {
            self.schedule_ready_check(player_id, 0, first_delay);
        }
    }

    fn schedule_ready_check(&mut self, player_id: String, attempt: u32, delay: Duration) {
        let sender = self.sender.clone();
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(Command::CheckReady { player_id, attempt });
        }));
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.loading.take() {
            task.abort();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.tracker.shutdown();
    }
}
