/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Server-side leaderboard mutations.
pub mod leaderboard_service;
/// Presence heartbeat bookkeeping.
pub mod presence_service;
/// Lifetime stats, achievements, streaks and daily goals.
pub mod progress_service;
/// Choice between the remote and local boards.
pub mod reconciler;
/// Quiz session state machine.
pub mod session_engine;
/// Async actor driving a session.
pub mod session_runner;
/// Per-question countdown.
pub mod timer;

#[cfg(test)]
pub(crate) mod testing;
