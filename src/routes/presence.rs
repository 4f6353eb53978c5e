use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    routing::get,
};
use validator::Validate;

use crate::{
    dto::presence::{PresenceAck, PresenceCount, PresencePing, PresenceQuery},
    error::AppError,
    services::presence_service,
    state::SharedState,
};

/// Presence heartbeat endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route("/api/presence", get(get_presence).post(ping_presence))
}

#[utoipa::path(
    get,
    path = "/api/presence",
    tag = "presence",
    responses((status = 200, description = "Clients seen within the TTL", body = PresenceCount))
)]
/// Return the number of clients currently online.
pub async fn get_presence(State(state): State<SharedState>) -> Json<PresenceCount> {
    Json(PresenceCount {
        online: presence_service::online(&state),
    })
}

#[utoipa::path(
    post,
    path = "/api/presence",
    tag = "presence",
    params(PresenceQuery),
    request_body = PresencePing,
    responses(
        (status = 200, description = "Heartbeat recorded", body = PresenceAck),
        (status = 400, description = "No client id in body or query")
    )
)]
/// Record a heartbeat. The id may come from the body or from `?id=`.
pub async fn ping_presence(
    State(state): State<SharedState>,
    Query(query): Query<PresenceQuery>,
    body: Bytes,
) -> Result<Json<PresenceAck>, AppError> {
    // An empty or malformed body still counts when the id is in the query.
    let ping: PresencePing = serde_json::from_slice(&body).unwrap_or_default();
    ping.validate()?;

    let id = ping.id.as_deref().or(query.id.as_deref());
    let online = presence_service::heartbeat(&state, id, ping.name.as_deref())?;
    Ok(Json(PresenceAck { ok: true, online }))
}
