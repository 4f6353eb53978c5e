//! Server-side persistence of every category board in one JSON document.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::dao::{
    kv_store::write_atomically,
    models::{Boards, BoardsDocument, StoredBoards},
    storage::{StorageError, StorageResult},
};
use crate::state::quiz::GLOBAL_CATEGORY;

/// Abstraction over where the server keeps its boards.
pub trait BoardStore: Send + Sync {
    /// Read every board; a legacy flat document is migrated.
    fn load(&self) -> BoxFuture<'static, StorageResult<Boards>>;
    /// Replace the stored boards.
    fn save(&self, boards: Boards) -> BoxFuture<'static, StorageResult<()>>;
}

/// [`BoardStore`] writing `{"boards": {...}}` to a file.
#[derive(Debug, Clone)]
pub struct JsonBoardFile {
    path: Arc<PathBuf>,
}

impl JsonBoardFile {
    /// Store backed by `path`; the file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }
}

fn read_boards(path: &Path) -> StorageResult<Boards> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Boards::new()),
        Err(err) => {
            return Err(StorageError::unavailable(
                format!("reading {}", path.display()),
                err,
            ));
        }
    };

    let stored: StoredBoards = serde_json::from_str(&contents)
        .map_err(|source| StorageError::corrupt(path.display().to_string(), source))?;
    match stored {
        StoredBoards::Current(document) => Ok(document.boards),
        StoredBoards::Legacy(board) => {
            let boards = Boards::from([(GLOBAL_CATEGORY.to_string(), board)]);
            info!(path = %path.display(), "migrating legacy leaderboard file");
            if let Err(err) = write_boards(path, &boards) {
                warn!(path = %path.display(), error = %err, "failed to persist migrated leaderboard");
            }
            Ok(boards)
        }
    }
}

fn write_boards(path: &Path, boards: &Boards) -> StorageResult<()> {
    let document = BoardsDocument {
        boards: boards.clone(),
    };
    let encoded = serde_json::to_string(&document)
        .map_err(|source| StorageError::corrupt(path.display().to_string(), source))?;
    write_atomically(path, &encoded)
}

async fn blocking<T, F>(work: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StorageResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|source| StorageError::unavailable("board file task panicked".into(), source))?
}

impl BoardStore for JsonBoardFile {
    fn load(&self) -> BoxFuture<'static, StorageResult<Boards>> {
        let path = self.path.clone();
        Box::pin(blocking(move || read_boards(&path)))
    }

    fn save(&self, boards: Boards) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.path.clone();
        Box::pin(blocking(move || write_boards(&path, &boards)))
    }
}
