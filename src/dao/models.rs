use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Cumulative scores of one category, keyed by player name in first-seen order.
pub type Board = IndexMap<String, u64>;

/// Every category board, keyed by category key.
pub type Boards = BTreeMap<String, Board>;

/// On-disk layout of the server leaderboard file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardsDocument {
    /// Boards keyed by category (`global` for uncategorised scores).
    pub boards: Boards,
}

/// Accepted shapes of the server leaderboard file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StoredBoards {
    /// Current schema.
    Current(BoardsDocument),
    /// Older flat `{name: score}` map holding only the global board.
    Legacy(Board),
}

/// Add `points` to `name` on `board`, returning the new total.
pub fn credit(board: &mut Board, name: &str, points: u64) -> u64 {
    let total = board.entry(name.to_string()).or_insert(0);
    *total = total.saturating_add(points);
    *total
}

/// Entries sorted by descending score; ties keep board order.
pub fn ranked(board: &Board) -> Vec<(&str, u64)> {
    let mut entries: Vec<(&str, u64)> = board
        .iter()
        .map(|(name, score)| (name.as_str(), *score))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_accumulates() {
        let mut board = Board::new();
        assert_eq!(credit(&mut board, "Alice", 3), 3);
        assert_eq!(credit(&mut board, "Alice", 4), 7);
        assert_eq!(board.get("Alice"), Some(&7));
    }

    #[test]
    fn ranked_orders_by_score_descending() {
        let mut board = Board::new();
        board.insert("Bob".into(), 2);
        board.insert("Alice".into(), 9);
        board.insert("Carol".into(), 2);

        assert_eq!(ranked(&board), vec![("Alice", 9), ("Bob", 2), ("Carol", 2)]);
    }

    #[test]
    fn legacy_flat_file_is_recognised() {
        let legacy: StoredBoards = serde_json::from_str(r#"{"Alice": 4}"#).unwrap();
        assert!(matches!(legacy, StoredBoards::Legacy(board) if board.get("Alice") == Some(&4)));

        let current: StoredBoards =
            serde_json::from_str(r#"{"boards": {"19": {"Bob": 1}}}"#).unwrap();
        assert!(matches!(current, StoredBoards::Current(doc) if doc.boards.contains_key("19")));
    }
}
