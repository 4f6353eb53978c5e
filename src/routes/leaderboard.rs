use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    routing::get,
};
use validator::Validate;

use crate::{
    dao::models::Board,
    dto::leaderboard::{CategoryQuery, LeaderboardUpdateResponse, ScoreSubmission},
    error::AppError,
    services::leaderboard_service,
    state::SharedState,
};

/// Cumulative leaderboard endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route(
        "/api/leaderboard",
        get(get_leaderboard)
            .post(submit_score)
            .delete(clear_leaderboard),
    )
}

#[utoipa::path(
    get,
    path = "/api/leaderboard",
    tag = "leaderboard",
    params(CategoryQuery),
    responses((
        status = 200,
        description = "Scores of the category keyed by player",
        body = std::collections::HashMap<String, u64>
    ))
)]
/// Return the cumulative board of a category (global when omitted).
pub async fn get_leaderboard(
    State(state): State<SharedState>,
    Query(query): Query<CategoryQuery>,
) -> Json<Board> {
    Json(leaderboard_service::board(&state, query.category.as_deref()).await)
}

#[utoipa::path(
    post,
    path = "/api/leaderboard",
    tag = "leaderboard",
    params(CategoryQuery),
    request_body = ScoreSubmission,
    responses(
        (status = 200, description = "Score added", body = LeaderboardUpdateResponse),
        (status = 400, description = "Invalid JSON or field values"),
        (status = 500, description = "Leaderboard could not be persisted")
    )
)]
/// Add points to a player's cumulative score.
pub async fn submit_score(
    State(state): State<SharedState>,
    Query(query): Query<CategoryQuery>,
    body: Bytes,
) -> Result<Json<LeaderboardUpdateResponse>, AppError> {
    let submission: ScoreSubmission = serde_json::from_slice(&body)
        .map_err(|err| AppError::BadRequest(format!("invalid JSON: {err}")))?;
    submission.validate()?;

    let leaderboard =
        leaderboard_service::submit_score(&state, submission, query.category.as_deref()).await?;
    Ok(Json(LeaderboardUpdateResponse {
        ok: true,
        leaderboard,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/leaderboard",
    tag = "leaderboard",
    params(CategoryQuery),
    responses(
        (status = 200, description = "Board cleared", body = LeaderboardUpdateResponse),
        (status = 500, description = "Leaderboard could not be persisted")
    )
)]
/// Clear one category, or every board when no category is given.
pub async fn clear_leaderboard(
    State(state): State<SharedState>,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<LeaderboardUpdateResponse>, AppError> {
    let leaderboard = leaderboard_service::clear(&state, query.category.as_deref()).await?;
    Ok(Json(LeaderboardUpdateResponse {
        ok: true,
        leaderboard,
    }))
}
