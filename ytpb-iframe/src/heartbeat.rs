//! Heartbeat scheduling
//!
//! While a video plays, a recurring heartbeat samples the playhead so milestones
//! between discrete native callbacks are noticed. The tracker decides when a
//! heartbeat starts and stops; a [`HeartbeatScheduler`] only owns the timers.
//!
//! - [`TokioHeartbeat`] runs one `tokio::time::interval` task per player and
//!   enqueues a tick command into the runtime's queue
//! - [`ExternalHeartbeat`] keeps no timers; the host calls
//!   [`crate::Tracker::heartbeat_tick`] for every player it reports as running

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::runtime::Command;

/// Handle of a running heartbeat, unique within the scheduler that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeartbeatHandle(u64);

impl HeartbeatHandle {
    fn issue(last: &mut u64) -> Self {
        *last += 1;
        HeartbeatHandle(*last)
    }
}

/// Owner of the per-player heartbeat timers
pub trait HeartbeatScheduler: Send {
    /// Start ticking for `player_id` every `period`
    fn start(&mut self, player_id: &str, period: Duration) -> HeartbeatHandle;

    /// Stop a heartbeat; stopping one that is no longer running does nothing
    fn stop(&mut self, handle: HeartbeatHandle);

    /// Stop every heartbeat
    fn stop_all(&mut self);
}

/// Heartbeats backed by tokio interval tasks
pub struct TokioHeartbeat {
    commands: mpsc::UnboundedSender<Command>,
    tasks: HashMap<HeartbeatHandle, JoinHandle<()>>,
    last_handle: u64,
}

impl TokioHeartbeat {
    pub fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            commands,
            tasks: HashMap::new(),
            last_handle: 0,
        }
    }

    /// Number of heartbeat tasks currently alive
    pub fn active(&self) -> usize {
        self.tasks.values().filter(|task| !task.is_finished()).count()
    }
}

impl HeartbeatScheduler for TokioHeartbeat {
    fn start(&mut self, player_id: &str, period: Duration) -> HeartbeatHandle {
        let handle = HeartbeatHandle::issue(&mut self.last_handle);
        let commands = self.commands.clone();
        let player_id = player_id.to_string();

        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                trace!(player_id = %player_id, "Heartbeat tick");
                if commands
                    .send(Command::Heartbeat {
                        player_id: player_id.clone(),
                        handle,
                    })
                    .is_err()
                {
                    // Runtime is gone
                    break;
                }
            }
        });

        debug!(?handle, "Heartbeat task started ({}ms interval)", period.as_millis());
        self.tasks.retain(|_, task| !task.is_finished());
        self.tasks.insert(handle, task);
        handle
    }

    fn stop(&mut self, handle: HeartbeatHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
            debug!(?handle, "Heartbeat task stopped");
        }
    }

    fn stop_all(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

impl Drop for TokioHeartbeat {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Heartbeats driven by the host
///
/// Clones share state, so the host can keep one to find out which players need
/// ticks while the tracker owns another.
#[derive(Debug, Clone, Default)]
pub struct ExternalHeartbeat {
    state: Arc<Mutex<ExternalState>>,
}

#[derive(Debug, Default)]
struct ExternalState {
    running: HashMap<HeartbeatHandle, (String, Duration)>,
    last_handle: u64,
}

impl ExternalHeartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Players with a running heartbeat, sorted by id
    pub fn running_players(&self) -> Vec<String> {
        let mut players: Vec<String> = self
            .lock()
            .running
            .values()
            .map(|(player_id, _)| player_id.clone())
            .collect();
        players.sort();
        players.dedup();
        players
    }

    pub fn is_running(&self, player_id: &str) -> bool {
        self.lock().running.values().any(|(id, _)| id == player_id)
    }

    /// Period requested for `player_id`'s heartbeat
    pub fn period(&self, player_id: &str) -> Option<Duration> {
        self.lock()
            .running
            .values()
            .find(|(id, _)| id == player_id)
            .map(|(_, period)| *period)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ExternalState> {
        // State stays consistent even if a holder panicked
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HeartbeatScheduler for ExternalHeartbeat {
    fn start(&mut self, player_id: &str, period: Duration) -> HeartbeatHandle {
        let mut state = self.lock();
        let handle = HeartbeatHandle::issue(&mut state.last_handle);
        state.running.insert(handle, (player_id.to_string(), period));
        handle
    }

    fn stop(&mut self, handle: HeartbeatHandle) {
        self.lock().running.remove(&handle);
    }

    fn stop_all(&mut self) {
        self.lock().running.clear();
    }
}
