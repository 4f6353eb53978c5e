//! Producers of [`Question`] batches: the remote trivia API and the static offline bank.

pub mod offline_bank;
pub mod opentdb;

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use thiserror::Error;

use crate::state::quiz::{Category, Difficulty, Mode, Question};

pub use offline_bank::OfflineBank;
pub use opentdb::OpenTdbClient;

/// Convenient result alias returning [`SourceError`] failures.
pub type SourceResult<T> = Result<T, SourceError>;

/// Failures produced while fetching questions.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Building the HTTP client failed.
    #[error("failed to build trivia client")]
    ClientBuilder {
        /// Underlying reqwest failure.
        #[source]
        source: reqwest::Error,
    },
    /// The request could not be sent.
    #[error("failed to reach the trivia source")]
    Http {
        /// Transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// Non-success status other than 429.
    #[error("trivia source answered HTTP {status}")]
    Status {
        /// Status returned by the source.
        status: StatusCode,
    },
    /// Payload did not match the expected shape.
    #[error("failed to decode trivia response")]
    Decode {
        /// Decoding failure.
        #[source]
        source: reqwest::Error,
    },
    /// Still rate limited after every retry.
    #[error("trivia source still rate limited after {attempts} attempts")]
    RateLimited {
        /// Requests made before giving up.
        attempts: u32,
    },
}

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Subject bucket.
    pub category: Category,
    /// Difficulty filter, when the source supports one.
    pub difficulty: Option<Difficulty>,
    /// Number of questions wanted.
    pub count: u32,
}

/// Anything able to produce a finite batch of questions on demand.
pub trait QuestionSource: Send + Sync {
    /// Fetch up to `request.count` questions.
    fn fetch(&self, request: BatchRequest) -> BoxFuture<'static, SourceResult<Vec<Question>>>;
}

/// Routes session fetches to the source matching the session mode.
#[derive(Clone)]
pub struct QuestionSources {
    online: Arc<dyn QuestionSource>,
    offline: Arc<dyn QuestionSource>,
}

impl QuestionSources {
    /// Pair an online and an offline source.
    pub fn new(online: Arc<dyn QuestionSource>, offline: Arc<dyn QuestionSource>) -> Self {
        Self { online, offline }
    }

    /// Source used for sessions in `mode`.
    pub fn for_mode(&self, mode: Mode) -> Arc<dyn QuestionSource> {
        match mode {
            Mode::Online => self.online.clone(),
            Mode::Offline => self.offline.clone(),
        }
    }
}
