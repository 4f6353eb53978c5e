//! Device-local fallback leaderboard. Only the score reconciler writes to it; local storage is
//! strictly a fallback ledger, never a cache of the remote board.

use std::sync::Arc;

use crate::{
    dao::{
        kv_store::{KeyValueStore, StoreKey, TypedStore},
        models::{Board, Boards, credit},
        storage::StorageResult,
    },
    state::quiz::Category,
};

/// Current per-category layout.
pub const LEADERBOARD_KEY: StoreKey<Boards> = StoreKey::new("trivia_leaderboard_v2");
/// Older flat global board, still honoured for the global view.
pub const LEGACY_LEADERBOARD_KEY: StoreKey<Board> = StoreKey::new("trivia_leaderboard");

/// Per-category cumulative boards persisted in the local key-value store.
#[derive(Clone)]
pub struct LocalLeaderboard {
    store: Arc<dyn KeyValueStore>,
}

impl LocalLeaderboard {
    /// Wrap a key-value store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Board for `category`.
    ///
    /// The legacy flat board is only consulted for the global view and only when no
    /// per-category map exists yet, so it never bleeds into a subject board.
    pub fn board(&self, category: &Category) -> StorageResult<Board> {
        if let Some(boards) = self.store.load(LEADERBOARD_KEY)? {
            return Ok(boards.get(category.key()).cloned().unwrap_or_default());
        }
        if !category.is_global() {
            return Ok(Board::new());
        }
        Ok(self.store.load(LEGACY_LEADERBOARD_KEY)?.unwrap_or_default())
    }

    /// Add `points` to `name` in `category` and return the updated board.
    pub fn increment(&self, name: &str, points: u64, category: &Category) -> StorageResult<Board> {
        let mut boards = self.store.load(LEADERBOARD_KEY)?.unwrap_or_default();
        let board = boards.entry(category.key().to_string()).or_default();
        credit(board, name, points);
        let updated = board.clone();
        self.store.save(LEADERBOARD_KEY, &boards)?;
        Ok(updated)
    }

    /// Reset the bucket of `category`; without a per-category map the legacy board is dropped.
    pub fn clear(&self, category: &Category) -> StorageResult<()> {
        match self.store.load(LEADERBOARD_KEY)? {
            Some(mut boards) => {
                boards.insert(category.key().to_string(), Board::new());
                self.store.save(LEADERBOARD_KEY, &boards)
            }
            None => self.store.remove(LEGACY_LEADERBOARD_KEY),
        }
    }

    /// Wipe every local board, current and legacy.
    pub fn clear_all(&self) -> StorageResult<()> {
        self.store.remove(LEADERBOARD_KEY)?;
        self.store.remove(LEGACY_LEADERBOARD_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::kv_store::MemoryStore;

    fn local() -> (Arc<MemoryStore>, LocalLeaderboard) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), LocalLeaderboard::new(store))
    }

    #[test]
    fn increments_are_cumulative_per_category() {
        let (_, board) = local();
        let math = Category::new("19");
        let history = Category::new("23");

        board.increment("Alice", 3, &math).unwrap();
        let updated = board.increment("Alice", 4, &math).unwrap();
        board.increment("Alice", 1, &history).unwrap();

        assert_eq!(updated.get("Alice"), Some(&7));
        assert_eq!(board.board(&math).unwrap().get("Alice"), Some(&7));
        assert_eq!(board.board(&history).unwrap().get("Alice"), Some(&1));
    }

    #[test]
    fn legacy_board_only_serves_global_view() {
        let (store, board) = local();
        let mut legacy = Board::new();
        legacy.insert("Old".into(), 5);
        store.save(LEGACY_LEADERBOARD_KEY, &legacy).unwrap();

        assert_eq!(board.board(&Category::global()).unwrap().get("Old"), Some(&5));
        assert!(board.board(&Category::new("19")).unwrap().is_empty());
    }

    #[test]
    fn legacy_board_is_ignored_once_v2_exists() {
        let (store, board) = local();
        let mut legacy = Board::new();
        legacy.insert("Old".into(), 5);
        store.save(LEGACY_LEADERBOARD_KEY, &legacy).unwrap();
        board.increment("New", 1, &Category::new("19")).unwrap();

        assert!(board.board(&Category::global()).unwrap().is_empty());
    }

    #[test]
    fn clear_resets_only_one_bucket() {
        let (_, board) = local();
        board.increment("Alice", 2, &Category::new("19")).unwrap();
        board.increment("Bob", 2, &Category::new("18")).unwrap();

        board.clear(&Category::new("19")).unwrap();

        assert!(board.board(&Category::new("19")).unwrap().is_empty());
        assert_eq!(board.board(&Category::new("18")).unwrap().get("Bob"), Some(&2));
    }

    #[test]
    fn clear_all_wipes_everything() {
        let (store, board) = local();
        board.increment("Alice", 2, &Category::new("19")).unwrap();
        store.save(LEGACY_LEADERBOARD_KEY, &Board::new()).unwrap();

        board.clear_all().unwrap();

        assert_eq!(store.load(LEADERBOARD_KEY).unwrap(), None);
        assert_eq!(store.load(LEGACY_LEADERBOARD_KEY).unwrap(), None);
    }
}
