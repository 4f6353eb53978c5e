//! In-memory fakes shared by the service tests.

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;

use crate::{
    dao::{
        board_file::BoardStore,
        models::{Board, Boards, credit},
        question_source::{BatchRequest, QuestionSource, SourceResult},
        remote_board::{ClearScope, RemoteError, RemoteLeaderboard, RemoteResult},
        storage::{StorageError, StorageResult},
    },
    state::quiz::{Category, Question},
};

pub(crate) fn board(entries: &[(&str, u64)]) -> Board {
    entries
        .iter()
        .map(|(name, score)| (name.to_string(), *score))
        .collect()
}

/// `count` questions whose correct answer is `A<i>`.
pub(crate) fn questions(count: usize) -> Vec<Question> {
    (0..count)
        .map(|i| {
            Question::new(
                format!("Q{i}"),
                format!("A{i}"),
                [format!("A{i}"), format!("B{i}"), format!("C{i}"), format!("D{i}")],
            )
            .unwrap()
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RemoteCall {
    Fetch { category: String },
    Increment { name: String, points: u64, category: String },
    Clear(ClearScope),
}

/// Remote leaderboard kept in memory that records every call.
#[derive(Default)]
pub(crate) struct FakeRemote {
    boards: Mutex<Boards>,
    unreachable: AtomicBool,
    failing_fetches: AtomicUsize,
    failing_players: Mutex<HashSet<String>>,
    calls: Mutex<Vec<RemoteCall>>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// The next `count` fetches fail; later ones follow `set_reachable`.
    pub(crate) fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_increments_for(&self, name: &str) {
        self.failing_players.lock().unwrap().insert(name.to_string());
    }

    pub(crate) fn seed(&self, category: &Category, entries: &[(&str, u64)]) {
        self.boards
            .lock()
            .unwrap()
            .insert(category.key().to_string(), board(entries));
    }

    pub(crate) fn board(&self, category: &Category) -> Board {
        self.boards
            .lock()
            .unwrap()
            .get(category.key())
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn increments(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::Increment { .. }))
            .count()
    }

    fn check_reachable(&self) -> RemoteResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("fake remote is offline".into()));
        }
        Ok(())
    }
}

impl RemoteLeaderboard for FakeRemote {
    fn fetch(&self, category: &Category) -> BoxFuture<'static, RemoteResult<Board>> {
        self.calls.lock().unwrap().push(RemoteCall::Fetch {
            category: category.key().to_string(),
        });
        let scripted_failure = self
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        let result = if scripted_failure {
            Err(RemoteError::Unreachable("scripted fetch failure".into()))
        } else {
            self.check_reachable().map(|()| self.board(category))
        };
        Box::pin(std::future::ready(result))
    }

    fn increment(
        &self,
        name: &str,
        points: u64,
        category: &Category,
    ) -> BoxFuture<'static, RemoteResult<Board>> {
        self.calls.lock().unwrap().push(RemoteCall::Increment {
            name: name.to_string(),
            points,
            category: category.key().to_string(),
        });
        let result = self.check_reachable().and_then(|()| {
            if self.failing_players.lock().unwrap().contains(name) {
                return Err(RemoteError::Unreachable(format!("rejected {name}")));
            }
            let mut boards = self.boards.lock().unwrap();
            let board = boards.entry(category.key().to_string()).or_default();
            credit(board, name, points);
            Ok(board.clone())
        });
        Box::pin(std::future::ready(result))
    }

    fn clear(&self, scope: &ClearScope) -> BoxFuture<'static, RemoteResult<()>> {
        self.calls
            .lock()
            .unwrap()
            .push(RemoteCall::Clear(scope.clone()));
        let result = self.check_reachable().map(|()| {
            let mut boards = self.boards.lock().unwrap();
            match scope {
                ClearScope::Category(category) => {
                    boards.remove(category.key());
                }
                ClearScope::All => boards.clear(),
            }
        });
        Box::pin(std::future::ready(result))
    }
}

/// Question source replaying scripted responses, then a fixed pool.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    responses: Mutex<VecDeque<SourceResult<Vec<Question>>>>,
    pool: Vec<Question>,
    delay: Option<Duration>,
    requests: Mutex<Vec<BatchRequest>>,
}

impl ScriptedSource {
    /// Serves `count` questions out of `pool` (cycled) for every request.
    pub(crate) fn with_pool(pool: Vec<Question>) -> Self {
        Self {
            pool,
            ..Self::default()
        }
    }

    pub(crate) fn push(&self, response: SourceResult<Vec<Question>>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn requests(&self) -> Vec<BatchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl QuestionSource for ScriptedSource {
    fn fetch(&self, request: BatchRequest) -> BoxFuture<'static, SourceResult<Vec<Question>>> {
        self.requests.lock().unwrap().push(request.clone());
        let scripted = self.responses.lock().unwrap().pop_front();
        let result = scripted.unwrap_or_else(|| {
            Ok(self
                .pool
                .iter()
                .cycle()
                .take(request.count as usize)
                .cloned()
                .collect())
        });
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

/// Server board store kept in memory; writes can be made to fail.
#[derive(Default)]
pub(crate) struct MemoryBoardStore {
    saved: Mutex<Option<Boards>>,
    failing: AtomicBool,
}

impl MemoryBoardStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Last successfully saved boards.
    pub(crate) fn saved(&self) -> Option<Boards> {
        self.saved.lock().unwrap().clone()
    }
}

impl BoardStore for MemoryBoardStore {
    fn load(&self) -> BoxFuture<'static, StorageResult<Boards>> {
        let boards = self.saved().unwrap_or_default();
        Box::pin(std::future::ready(Ok(boards)))
    }

    fn save(&self, boards: Boards) -> BoxFuture<'static, StorageResult<()>> {
        let result = if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::unavailable(
                "disk full".into(),
                std::io::Error::other("disk full"),
            ))
        } else {
            *self.saved.lock().unwrap() = Some(boards);
            Ok(())
        };
        Box::pin(std::future::ready(result))
    }
}
