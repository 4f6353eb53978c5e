use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the Trivia Champ leaderboard server.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::leaderboard::get_leaderboard,
        crate::routes::leaderboard::submit_score,
        crate::routes::leaderboard::clear_leaderboard,
        crate::routes::presence::get_presence,
        crate::routes::presence::ping_presence,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::leaderboard::ScoreSubmission,
            crate::dto::leaderboard::LeaderboardUpdateResponse,
            crate::dto::presence::PresencePing,
            crate::dto::presence::PresenceCount,
            crate::dto::presence::PresenceAck,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "leaderboard", description = "Cumulative scores per category"),
        (name = "presence", description = "Online player heartbeats"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        assert!(paths.contains(&"/api/leaderboard"));
        assert!(paths.contains(&"/api/presence"));
        assert!(paths.contains(&"/healthcheck"));
    }
}
