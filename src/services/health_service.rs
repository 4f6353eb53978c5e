use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the last board write succeeded.
pub fn health_status(state: &SharedState) -> HealthResponse {
    if state.is_degraded() {
        warn!("leaderboard file not writable (degraded mode)");
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}
