use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::{question_source::SourceError, storage::StorageError},
    state::state_machine::{InvalidTransition, PlanError},
};

/// Errors that can occur in server-side service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The leaderboard could not be written to its backing file.
    #[error("failed to persist leaderboard")]
    Persist(#[source] StorageError),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match &err {
            ServiceError::Persist(source) => {
                tracing::error!(error = %source, "leaderboard write failed");
                AppError::Internal(err.to_string())
            }
            ServiceError::InvalidInput(message) => AppError::BadRequest(message.clone()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

/// Errors surfaced by the quiz session engine to the UI layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Submit was pressed without choosing an option; nothing changed.
    #[error("please select an answer first")]
    SelectionRequired,
    /// An online session could not obtain a single question.
    #[error("could not fetch questions, try again later")]
    SourceExhausted,
    /// The question source failed for a reason other than rate limiting.
    #[error("error starting quiz: {0}")]
    NetworkUnavailable(#[source] SourceError),
    /// Session settings did not validate.
    #[error("invalid session settings: {0}")]
    InvalidConfig(#[from] ValidationErrors),
    /// The command is not valid in the current phase.
    #[error(transparent)]
    InvalidTransition(InvalidTransition),
    /// The command needs a session but none is running.
    #[error("no quiz session is running")]
    NotRunning,
    /// Another transition (such as a start fetch) is still in flight.
    #[error("another session transition is still pending")]
    Busy,
    /// A fetch result arrived for a session that no longer exists.
    #[error("fetch result belongs to a session that is no longer active")]
    Stale,
}

impl From<PlanError> for SessionError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => SessionError::Busy,
            PlanError::InvalidTransition(invalid) => SessionError::InvalidTransition(invalid),
        }
    }
}

impl From<SourceError> for SessionError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::RateLimited { .. } => SessionError::SourceExhausted,
            other => SessionError::NetworkUnavailable(other),
        }
    }
}
