//! Keeps one authoritative cumulative board per category across the remote service and
//! the per-device fallback ledger.
//!
//! Reads pick exactly one store (remote when it has data, else local) and never union the
//! two. When the remote bucket is empty or unreachable but local history exists, a one-shot
//! delta sync pushes only the positive difference so historical local progress is credited
//! once. Writes go to the remote first and land locally only when the remote refuses them.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    dao::{
        local_board::LocalLeaderboard,
        models::Board,
        remote_board::{ClearScope, RemoteLeaderboard},
        storage::StorageResult,
    },
    state::quiz::Category,
};

/// Which store a board came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardSource {
    /// The shared remote leaderboard.
    Remote,
    /// The per-device fallback ledger.
    Local,
    /// Neither store had any entry.
    Empty,
}

/// Board chosen as authoritative for one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBoard {
    /// Store the board was read from.
    pub source: BoardSource,
    /// Player name to cumulative score.
    pub board: Board,
}

/// Decide which store is authoritative: a non-empty remote, else a non-empty local, else
/// nothing. The boards are never merged.
pub fn choose_authoritative(remote: Option<Board>, local: Board) -> ResolvedBoard {
    match remote {
        Some(board) if !board.is_empty() => ResolvedBoard {
            source: BoardSource::Remote,
            board,
        },
        _ if !local.is_empty() => ResolvedBoard {
            source: BoardSource::Local,
            board: local,
        },
        _ => ResolvedBoard {
            source: BoardSource::Empty,
            board: Board::new(),
        },
    }
}

/// Positive `local - remote` differences, in local board order.
pub fn sync_deltas(local: &Board, remote: &Board) -> Vec<(String, u64)> {
    local
        .iter()
        .filter_map(|(name, &score)| {
            let credited = remote.get(name).copied().unwrap_or(0);
            let delta = score.saturating_sub(credited);
            (delta > 0).then(|| (name.clone(), delta))
        })
        .collect()
}

/// Result of one sync attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Remote could not be read, so nothing was attempted.
    pub skipped: bool,
    /// Increments accepted by the remote.
    pub posted: usize,
    /// Increments that failed and were swallowed.
    pub failed: usize,
}

/// Which store accepted a score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    /// [`BoardSource::Remote`] or [`BoardSource::Local`].
    pub stored_in: BoardSource,
    /// Board returned by the store that accepted the write.
    pub board: Board,
}

/// Per-store result of a clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearReport {
    /// The local bucket (or everything) was wiped.
    pub local_cleared: bool,
    /// The remote accepted the delete.
    pub remote_cleared: bool,
}

/// Mediates every leaderboard read and write made by the client.
#[derive(Clone)]
pub struct ScoreReconciler {
    remote: Arc<dyn RemoteLeaderboard>,
    local: LocalLeaderboard,
}

impl ScoreReconciler {
    /// Pair the remote service with the local fallback ledger.
    pub fn new(remote: Arc<dyn RemoteLeaderboard>, local: LocalLeaderboard) -> Self {
        Self { remote, local }
    }

    /// Local ledger handle, for read-only rendering collaborators.
    pub fn local(&self) -> &LocalLeaderboard {
        &self.local
    }

    async fn read_remote(&self, category: &Category) -> Option<Board> {
        match self.remote.fetch(category).await {
            Ok(board) => Some(board),
            Err(err) => {
                debug!(category = %category, error = %err, "remote leaderboard unreachable");
                None
            }
        }
    }

    fn read_local(&self, category: &Category) -> Board {
        self.local.board(category).unwrap_or_else(|err| {
            warn!(category = %category, error = %err, "local leaderboard unreadable");
            Board::new()
        })
    }

    /// Authoritative board for `category`, running a delta sync first when only local
    /// history exists.
    pub async fn get_board(&self, category: &Category) -> ResolvedBoard {
        let remote = self.read_remote(category).await;
        if remote.as_ref().is_some_and(|board| !board.is_empty()) {
            return choose_authoritative(remote, Board::new());
        }

        let local = self.read_local(category);
        if local.is_empty() {
            return choose_authoritative(remote, local);
        }

        self.sync_once(category).await;
        let remote = self.read_remote(category).await;
        choose_authoritative(remote, self.read_local(category))
    }

    /// Push positive local deltas for `category` to the remote, computed against a fresh
    /// remote read. Best effort.
    pub async fn sync_once(&self, category: &Category) -> SyncReport {
        let local = self.read_local(category);
        if local.is_empty() {
            return SyncReport::default();
        }
        let remote = self.read_remote(category).await;
        self.sync_with(category, &local, remote.as_ref()).await
    }

    async fn sync_with(
        &self,
        category: &Category,
        local: &Board,
        remote: Option<&Board>,
    ) -> SyncReport {
        let Some(remote) = remote else {
            return SyncReport {
                skipped: true,
                ..SyncReport::default()
            };
        };

        let mut report = SyncReport::default();
        for (name, delta) in sync_deltas(local, remote) {
            match self.remote.increment(&name, delta, category).await {
                Ok(_) => report.posted += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        category = %category,
                        player = %name,
                        delta,
                        error = %err,
                        "leaderboard sync increment failed"
                    );
                }
            }
        }

        if report.posted > 0 {
            info!(category = %category, posted = report.posted, "synced local scores to remote");
        }
        report
    }

    /// Credit `points` to `player`: remote first, local only when the remote write fails.
    pub async fn record_score(
        &self,
        player: &str,
        points: u64,
        category: &Category,
    ) -> StorageResult<RecordOutcome> {
        match self.remote.increment(player, points, category).await {
            Ok(board) => Ok(RecordOutcome {
                stored_in: BoardSource::Remote,
                board,
            }),
            Err(err) => {
                warn!(
                    category = %category,
                    player,
                    error = %err,
                    "remote score submit failed, recording locally"
                );
                let board = self.local.increment(player, points, category)?;
                Ok(RecordOutcome {
                    stored_in: BoardSource::Local,
                    board,
                })
            }
        }
    }

    /// Wipe the local scope, then ask the remote to do the same. Neither failure is fatal.
    pub async fn clear(&self, scope: &ClearScope) -> ClearReport {
        let local = match scope {
            ClearScope::Category(category) => self.local.clear(category),
            ClearScope::All => self.local.clear_all(),
        };
        let local_cleared = match local {
            Ok(()) => true,
            Err(err) => {
                warn!(scope = ?scope, error = %err, "local leaderboard clear failed");
                false
            }
        };

        let remote_cleared = match self.remote.clear(scope).await {
            Ok(()) => true,
            Err(err) => {
                warn!(scope = ?scope, error = %err, "remote leaderboard clear failed");
                false
            }
        };

        ClearReport {
            local_cleared,
            remote_cleared,
        }
    }
}
