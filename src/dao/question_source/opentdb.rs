//! Open Trivia DB client. Rate limiting (HTTP 429) is retried with `Retry-After` or an
//! exponential backoff; every other failure is returned to the caller untouched.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Response, StatusCode, header};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::state::quiz::Question;

use super::{BatchRequest, QuestionSource, SourceError, SourceResult};

/// Largest batch the API serves per call.
pub const MAX_AMOUNT: u32 = 20;
/// Default number of attempts when the API keeps answering 429.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// First backoff used when no `Retry-After` header is present.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

const API_PATH: &str = "/api.php";
const USER_AGENT: &str = "TriviaChamp/1.0";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    results: Vec<ApiQuestion>,
}

#[derive(Debug, Deserialize)]
struct ApiQuestion {
    question: String,
    correct_answer: String,
    #[serde(default)]
    incorrect_answers: Vec<String>,
}

impl ApiQuestion {
    fn into_question(self) -> Option<Question> {
        let text = decode_entities(&self.question);
        let answer = decode_entities(&self.correct_answer);
        let options = self
            .incorrect_answers
            .iter()
            .map(|option| decode_entities(option))
            .chain(std::iter::once(answer.clone()));

        match Question::new(text, answer, options) {
            Ok(question) => Some(question),
            Err(err) => {
                warn!(error = %err, "skipping malformed trivia question");
                None
            }
        }
    }
}

/// Turn HTML entities such as `&quot;` or `&#039;` into plain text.
pub fn decode_entities(raw: &str) -> String {
    html_escape::decode_html_entities(raw).into_owned()
}

/// [`QuestionSource`] backed by `GET {base}/api.php`.
#[derive(Clone)]
pub struct OpenTdbClient {
    client: Client,
    base_url: Arc<str>,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl OpenTdbClient {
    /// Build a client targeting `base_url` (for example `https://opentdb.com`).
    pub fn new(base_url: &str, max_attempts: u32) -> SourceResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| SourceError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            max_attempts: max_attempts.max(1),
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    /// Override the first backoff delay.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    fn query(request: &BatchRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("amount", request.count.clamp(1, MAX_AMOUNT).to_string()),
            ("type", "multiple".to_string()),
        ];
        if let Some(category) = request.category.api_id() {
            query.push(("category", category.to_string()));
        }
        if let Some(difficulty) = request.difficulty {
            query.push(("difficulty", difficulty.as_str().to_string()));
        }
        query
    }

    async fn fetch_batch(self, request: BatchRequest) -> SourceResult<Vec<Question>> {
        let url = format!("{}{}", self.base_url, API_PATH);
        let query = Self::query(&request);
        let mut backoff = self.initial_backoff;

        for attempt in 1..=self.max_attempts {
            let response = self
                .client
                .get(&url)
                .header(header::ACCEPT, "application/json")
                .query(&query)
                .send()
                .await
                .map_err(|source| SourceError::Http { source })?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after(&response).unwrap_or(backoff);
                warn!(
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    "trivia source rate limited"
                );
                if attempt < self.max_attempts {
                    sleep(wait).await;
                }
                backoff *= 2;
                continue;
            }

            if !response.status().is_success() {
                return Err(SourceError::Status {
                    status: response.status(),
                });
            }

            let payload = response
                .json::<ApiResponse>()
                .await
                .map_err(|source| SourceError::Decode { source })?;
            let questions: Vec<Question> = payload
                .results
                .into_iter()
                .filter_map(ApiQuestion::into_question)
                .collect();
            debug!(
                category = %request.category,
                count = questions.len(),
                "fetched trivia questions"
            );
            return Ok(questions);
        }

        Err(SourceError::RateLimited {
            attempts: self.max_attempts,
        })
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

impl QuestionSource for OpenTdbClient {
    fn fetch(&self, request: BatchRequest) -> BoxFuture<'static, SourceResult<Vec<Question>>> {
        Box::pin(self.clone().fetch_batch(request))
    }
}
