//! Presence bookkeeping: clients ping while they sit on the online screens and the
//! server counts those seen within the TTL.

use std::time::Instant;

use tracing::debug;

use crate::{
    error::ServiceError,
    state::{PresenceEntry, SharedState},
};

/// Drop entries older than the TTL and return how many remain.
pub fn prune(state: &SharedState, now: Instant) -> usize {
    let ttl = state.presence_ttl();
    state
        .presence()
        .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= ttl);
    state.presence().len()
}

/// Record a heartbeat from `id`, returning the number of clients online.
pub fn heartbeat(
    state: &SharedState,
    id: Option<&str>,
    name: Option<&str>,
) -> Result<usize, ServiceError> {
    let id = id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServiceError::InvalidInput("missing id".into()))?;

    let now = Instant::now();
    state.presence().insert(
        id.to_string(),
        PresenceEntry {
            name: name.unwrap_or_default().trim().to_string(),
            last_seen: now,
        },
    );
    let online = prune(state, now);
    debug!(client = id, online, "presence heartbeat");
    Ok(online)
}

/// Number of clients seen within the TTL.
pub fn online(state: &SharedState) -> usize {
    prune(state, Instant::now())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{dao::models::Boards, services::testing::MemoryBoardStore, state::AppState};

    fn state() -> SharedState {
        AppState::new(
            Arc::new(MemoryBoardStore::new()),
            Boards::new(),
            Duration::from_secs(45),
        )
    }

    #[test]
    fn missing_id_is_rejected() {
        let state = state();
        assert!(matches!(
            heartbeat(&state, None, Some("Ann")),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(heartbeat(&state, Some("  "), None).is_err());
        assert_eq!(online(&state), 0);
    }

    #[test]
    fn repeated_pings_count_once() {
        let state = state();
        assert_eq!(heartbeat(&state, Some("a"), Some("Ann")).unwrap(), 1);
        assert_eq!(heartbeat(&state, Some("a"), Some("Ann")).unwrap(), 1);
        assert_eq!(heartbeat(&state, Some("b"), None).unwrap(), 2);
        assert_eq!(state.presence().get("a").unwrap().name, "Ann");
    }

    #[test]
    fn stale_entries_are_pruned() {
        let state = state();
        heartbeat(&state, Some("a"), None).unwrap();
        let later = Instant::now() + Duration::from_secs(46);

        assert_eq!(prune(&state, later), 0);
    }
}
