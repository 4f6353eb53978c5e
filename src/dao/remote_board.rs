//! Client for the shared leaderboard HTTP API. Any transport failure or non-success status
//! means "unreachable"; callers decide the fallback.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode, header};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{
    dao::models::Board,
    dto::leaderboard::{LeaderboardUpdateResponse, ScoreSubmission},
    state::quiz::Category,
};

const LEADERBOARD_PATH: &str = "/api/leaderboard";

/// Convenient result alias returning [`RemoteError`] failures.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failures talking to the remote leaderboard.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build leaderboard client")]
    ClientBuilder {
        /// Underlying reqwest failure.
        #[source]
        source: reqwest::Error,
    },
    /// The request could not be sent.
    #[error("failed to send leaderboard request to `{path}`")]
    RequestSend {
        /// Request path.
        path: String,
        /// Underlying transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    #[error("unexpected leaderboard response status {status} for `{path}`")]
    RequestStatus {
        /// Request path.
        path: String,
        /// Status returned by the server.
        status: StatusCode,
    },
    /// The response body was not the expected JSON.
    #[error("failed to decode leaderboard response for `{path}`")]
    DecodeResponse {
        /// Request path.
        path: String,
        /// Decoding failure.
        #[source]
        source: reqwest::Error,
    },
    /// Used by in-process fakes to simulate a dead server.
    #[error("leaderboard unreachable: {0}")]
    Unreachable(String),
}

/// Which boards a clear operation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    /// A single category bucket.
    Category(Category),
    /// Every bucket.
    All,
}

/// Remote authoritative board shared by every player.
pub trait RemoteLeaderboard: Send + Sync {
    /// Read the board of `category`.
    fn fetch(&self, category: &Category) -> BoxFuture<'static, RemoteResult<Board>>;
    /// Server-side cumulative increment; returns the updated board.
    fn increment(
        &self,
        name: &str,
        points: u64,
        category: &Category,
    ) -> BoxFuture<'static, RemoteResult<Board>>;
    /// Delete the boards selected by `scope`.
    fn clear(&self, scope: &ClearScope) -> BoxFuture<'static, RemoteResult<()>>;
}

/// [`RemoteLeaderboard`] backed by the `/api/leaderboard` HTTP endpoints.
#[derive(Clone)]
pub struct HttpLeaderboard {
    client: Client,
    base_url: Arc<str>,
}

impl HttpLeaderboard {
    /// Build a client targeting `base_url` (scheme, host and port, no path).
    pub fn new(base_url: &str) -> RemoteResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| RemoteError::ClientBuilder { source })?;
        Ok(Self::with_client(client, base_url))
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    fn request(&self, method: Method) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, LEADERBOARD_PATH);
        self.client
            .request(method, url)
            .header(header::CACHE_CONTROL, "no-cache")
    }

    async fn send_json<T>(builder: reqwest::RequestBuilder) -> RemoteResult<T>
    where
        T: DeserializeOwned,
    {
        let response = builder
            .send()
            .await
            .map_err(|source| RemoteError::RequestSend {
                path: LEADERBOARD_PATH.to_string(),
                source,
            })?;

        if response.status() != StatusCode::OK {
            return Err(RemoteError::RequestStatus {
                path: LEADERBOARD_PATH.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| RemoteError::DecodeResponse {
                path: LEADERBOARD_PATH.to_string(),
                source,
            })
    }
}

impl RemoteLeaderboard for HttpLeaderboard {
    fn fetch(&self, category: &Category) -> BoxFuture<'static, RemoteResult<Board>> {
        let builder = self
            .request(Method::GET)
            .query(&[("category", category.key())]);
        Box::pin(Self::send_json::<Board>(builder))
    }

    fn increment(
        &self,
        name: &str,
        points: u64,
        category: &Category,
    ) -> BoxFuture<'static, RemoteResult<Board>> {
        let body = ScoreSubmission {
            name: name.to_string(),
            score: i64::try_from(points).unwrap_or(i64::MAX),
            category: Some(category.key().to_string()),
        };
        let builder = self.request(Method::POST).json(&body);
        Box::pin(async move {
            let response = Self::send_json::<LeaderboardUpdateResponse>(builder).await?;
            Ok(response.leaderboard)
        })
    }

    fn clear(&self, scope: &ClearScope) -> BoxFuture<'static, RemoteResult<()>> {
        let mut builder = self.request(Method::DELETE);
        if let ClearScope::Category(category) = scope {
            builder = builder.query(&[("category", category.key())]);
        }
        Box::pin(async move {
            Self::send_json::<LeaderboardUpdateResponse>(builder).await?;
            Ok(())
        })
    }
}
