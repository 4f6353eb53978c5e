/// Server-side leaderboard file.
pub mod board_file;
/// Typed key-value persistence for the client.
pub mod kv_store;
/// Per-device fallback leaderboard.
pub mod local_board;
/// Leaderboard data model shared by client and server.
pub mod models;
/// Presence heartbeat client.
pub mod presence_client;
/// Online and offline question providers.
pub mod question_source;
/// HTTP client for the shared leaderboard.
pub mod remote_board;
/// Storage error types.
pub mod storage;
