use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{dao::models::Board, dto::validation::validate_label};

/// Optional `?category=` selector shared by the leaderboard routes.
#[derive(Debug, Default, Clone, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CategoryQuery {
    /// Category key; blank or absent selects the global board.
    #[serde(default)]
    pub category: Option<String>,
}

/// Request body adding points to a player's cumulative score.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct ScoreSubmission {
    /// Player credited with the points; blank leaves the board unchanged.
    #[serde(default)]
    #[validate(custom(function = "validate_label"))]
    pub name: String,
    /// Points to add (default 0). Scores only ever increase.
    #[serde(default)]
    #[validate(range(min = 0))]
    pub score: i64,
    /// Target category; falls back to `?category=` and then to the global board.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_label"))]
    pub category: Option<String>,
}

/// Board returned after a mutation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardUpdateResponse {
    /// Always true on success.
    pub ok: bool,
    /// Cumulative scores of the affected category, keyed by player name.
    #[schema(value_type = Object)]
    pub leaderboard: Board,
}
