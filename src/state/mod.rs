pub mod quiz;
pub mod state_machine;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use tokio::sync::{Mutex, watch};

use crate::dao::{board_file::BoardStore, models::Boards};

pub type SharedState = Arc<AppState>;

/// Last heartbeat received from one client.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub name: String,
    pub last_seen: Instant,
}

/// Central state of the leaderboard server.
pub struct AppState {
    boards: Mutex<Boards>,
    store: Arc<dyn BoardStore>,
    presence: DashMap<String, PresenceEntry>,
    presence_ttl: Duration,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// `boards` is the content already loaded from `store`.
    pub fn new(store: Arc<dyn BoardStore>, boards: Boards, presence_ttl: Duration) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(false);
        Arc::new(Self {
            boards: Mutex::new(boards),
            store,
            presence: DashMap::new(),
            presence_ttl,
            degraded: degraded_tx,
        })
    }

    /// In-memory boards. Holding the guard serialises mutations with their persistence.
    pub fn boards(&self) -> &Mutex<Boards> {
        &self.boards
    }

    /// Backing store the boards are persisted to.
    pub fn store(&self) -> &Arc<dyn BoardStore> {
        &self.store
    }

    /// Registry of clients seen recently, keyed by client id.
    pub fn presence(&self) -> &DashMap<String, PresenceEntry> {
        &self.presence
    }

    /// Age after which a presence entry is pruned.
    pub fn presence_ttl(&self) -> Duration {
        self.presence_ttl
    }

    /// Current degraded flag; set while the board file cannot be written.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
