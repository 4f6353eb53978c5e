//! Server-side leaderboard operations. Every mutation is applied to a copy, persisted,
//! and only then committed to memory, so a failed write leaves the served boards intact.

use tracing::{info, warn};

use crate::{
    dao::{
        board_file::BoardStore,
        models::{Board, Boards, credit},
    },
    dto::leaderboard::ScoreSubmission,
    error::ServiceError,
    state::{SharedState, quiz::GLOBAL_CATEGORY},
};

/// Normalise a raw category selector: trimmed, blank means the global board.
pub fn category_key(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => GLOBAL_CATEGORY.to_string(),
    }
}

/// Load the boards at startup. An unreadable file starts the server with empty boards.
pub async fn load_boards(store: &dyn BoardStore) -> Boards {
    match store.load().await {
        Ok(boards) => {
            info!(categories = boards.len(), "leaderboard loaded");
            boards
        }
        Err(err) => {
            warn!(error = %err, "failed to load leaderboard; starting empty");
            Boards::new()
        }
    }
}

/// Board of `category`, empty when nobody scored there yet.
pub async fn board(state: &SharedState, category: Option<&str>) -> Board {
    let key = category_key(category);
    let boards = state.boards().lock().await;
    boards.get(&key).cloned().unwrap_or_default()
}

/// Add the submitted points to the player's cumulative score and return the board.
///
/// The body's category wins over `query_category`. A blank name leaves the board
/// unchanged.
pub async fn submit_score(
    state: &SharedState,
    submission: ScoreSubmission,
    query_category: Option<&str>,
) -> Result<Board, ServiceError> {
    let points = u64::try_from(submission.score)
        .map_err(|_| ServiceError::InvalidInput("score must not be negative".into()))?;
    let body_category = submission
        .category
        .as_deref()
        .filter(|category| !category.trim().is_empty());
    let key = category_key(body_category.or(query_category));
    let name = submission.name.trim();

    let mut boards = state.boards().lock().await;
    if name.is_empty() {
        return Ok(boards.get(&key).cloned().unwrap_or_default());
    }

    let mut next = boards.clone();
    let bucket = next.entry(key.clone()).or_default();
    let total = credit(bucket, name, points);
    let updated = bucket.clone();

    persist(state, &next).await?;
    *boards = next;
    info!(category = %key, player = name, points, total, "score recorded");
    Ok(updated)
}

/// Clear one category, or every board when `category` is absent.
///
/// Returns the affected board after the clear (the global board for a full wipe).
pub async fn clear(state: &SharedState, category: Option<&str>) -> Result<Board, ServiceError> {
    let mut boards = state.boards().lock().await;
    let mut next = boards.clone();
    let shown = match category {
        Some(raw) => {
            let key = category_key(Some(raw));
            next.insert(key.clone(), Board::new());
            key
        }
        None => {
            next.clear();
            GLOBAL_CATEGORY.to_string()
        }
    };

    persist(state, &next).await?;
    *boards = next;
    info!(category = %shown, "leaderboard cleared");
    Ok(boards.get(&shown).cloned().unwrap_or_default())
}

async fn persist(state: &SharedState, boards: &Boards) -> Result<(), ServiceError> {
    match state.store().save(boards.clone()).await {
        Ok(()) => {
            state.update_degraded(false);
            Ok(())
        }
        Err(err) => {
            state.update_degraded(true);
            Err(ServiceError::Persist(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        services::testing::{MemoryBoardStore, board as entries},
        state::AppState,
    };

    fn state_with(store: Arc<MemoryBoardStore>, boards: Boards) -> SharedState {
        AppState::new(store, boards, Duration::from_secs(45))
    }

    fn submission(name: &str, score: i64, category: Option<&str>) -> ScoreSubmission {
        ScoreSubmission {
            name: name.to_string(),
            score,
            category: category.map(str::to_string),
        }
    }

    #[test]
    fn category_key_trims_and_defaults_to_global() {
        assert_eq!(category_key(None), "global");
        assert_eq!(category_key(Some("   ")), "global");
        assert_eq!(category_key(Some(" 19 ")), "19");
    }

    #[tokio::test]
    async fn scores_accumulate_per_category() {
        let store = Arc::new(MemoryBoardStore::new());
        let state = state_with(store.clone(), Boards::new());

        submit_score(&state, submission("Ann", 3, Some("19")), None)
            .await
            .unwrap();
        let board = submit_score(&state, submission(" Ann ", 4, None), Some("19"))
            .await
            .unwrap();

        assert_eq!(board, entries(&[("Ann", 7)]));
        assert!(super::board(&state, None).await.is_empty());
        assert_eq!(store.saved().unwrap()["19"], entries(&[("Ann", 7)]));
    }

    #[tokio::test]
    async fn blank_name_returns_board_without_writing() {
        let store = Arc::new(MemoryBoardStore::new());
        let boards = Boards::from([("global".to_string(), entries(&[("Ben", 2)]))]);
        let state = state_with(store.clone(), boards);

        let board = submit_score(&state, submission("  ", 5, None), None)
            .await
            .unwrap();

        assert_eq!(board, entries(&[("Ben", 2)]));
        assert!(store.saved().is_none());
    }

    #[tokio::test]
    async fn failed_persist_keeps_memory_and_flags_degraded() {
        let store = Arc::new(MemoryBoardStore::new());
        let state = state_with(store.clone(), Boards::new());
        store.set_failing(true);

        let err = submit_score(&state, submission("Ann", 3, None), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Persist(_)));
        assert!(super::board(&state, None).await.is_empty());
        assert!(state.is_degraded());

        store.set_failing(false);
        submit_score(&state, submission("Ann", 3, None), None)
            .await
            .unwrap();
        assert!(!state.is_degraded());
    }

    #[tokio::test]
    async fn clear_scopes() {
        let store = Arc::new(MemoryBoardStore::new());
        let boards = Boards::from([
            ("global".to_string(), entries(&[("Ann", 1)])),
            ("19".to_string(), entries(&[("Ben", 2)])),
        ]);
        let state = state_with(store.clone(), boards);

        let cleared = clear(&state, Some("19")).await.unwrap();
        assert!(cleared.is_empty());
        assert_eq!(super::board(&state, None).await, entries(&[("Ann", 1)]));

        let cleared = clear(&state, None).await.unwrap();
        assert!(cleared.is_empty());
        assert_eq!(store.saved(), Some(Boards::new()));
    }
}
