//! Player lifecycle registry
//!
//! Tracks every instantiated player by element id. The host environment detects
//! removals (element detached, `src` navigated away from a player URL, page
//! unload) through its [`RemovalWatcher`] and reports them to the tracker, which
//! synthesizes a `player removed` event and drops the entry here.

use std::collections::BTreeMap;
use tracing::debug;

use crate::element::ElementRef;
use crate::session::TrackedPlayer;

/// Host capability that observes player elements for removal
pub trait RemovalWatcher: Send {
    /// Start observing the element's parent for removal and its `src` for changes
    fn watch(&mut self, element: &ElementRef);

    /// Stop observing the element with this id
    fn unwatch(&mut self, player_id: &str);
}

/// Watcher for hosts that report removals without per-element subscriptions
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWatcher;

impl RemovalWatcher for NoopWatcher {
    fn watch(&mut self, _element: &ElementRef) {}

    fn unwatch(&mut self, _player_id: &str) {}
}

/// Instantiated players keyed by element id
pub struct PlayerRegistry {
    players: BTreeMap<String, TrackedPlayer>,
    watcher: Box<dyn RemovalWatcher>,
}

impl PlayerRegistry {
    pub fn new(watcher: Box<dyn RemovalWatcher>) -> Self {
        Self {
            players: BTreeMap::new(),
            watcher,
        }
    }

    /// Register a player and start watching its element
    ///
    /// Replaces (and returns) an entry already registered under the same id.
    pub fn insert(&mut self, player: TrackedPlayer) -> Option<TrackedPlayer> {
        let player_id = player.player_id().to_string();
        self.watcher.watch(&player.element);
        debug!(player_id = %player_id, "Player registered");
        self.players.insert(player_id, player)
    }

    /// Drop a player and stop watching its element
    pub fn remove(&mut self, player_id: &str) -> Option<TrackedPlayer> {
        let removed = self.players.remove(player_id)?;
        self.watcher.unwatch(player_id);
        debug!(player_id = %player_id, "Player unregistered");
        Some(removed)
    }

    pub fn get(&self, player_id: &str) -> Option<&TrackedPlayer> {
        self.players.get(player_id)
    }

    pub fn get_mut(&mut self, player_id: &str) -> Option<&mut TrackedPlayer> {
        self.players.get_mut(player_id)
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    /// Registered ids in ascending order
    pub fn ids(&self) -> Vec<String> {
        self.players.keys().cloned().collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedPlayer> {
        self.players.values_mut()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl std::fmt::Debug for PlayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerRegistry")
            .field("players", &self.players.keys().collect::<Vec<_>>())
            .finish()
    }
}
