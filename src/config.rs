//! Application-level configuration loading for the leaderboard server and the terminal
//! client.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::question_source::opentdb::DEFAULT_MAX_ATTEMPTS;

/// Default location on disk where the binaries look for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRIVIA_CHAMP_CONFIG_PATH";
/// Environment variable overriding the listening port, as set by hosting platforms.
const PORT_ENV: &str = "PORT";

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_BOARD_PATH: &str = "leaderboard.json";
const DEFAULT_PRESENCE_TTL_SECS: u64 = 45;
const DEFAULT_LEADERBOARD_URL: &str = "http://localhost:8000";
const DEFAULT_TRIVIA_URL: &str = "https://opentdb.com";
const DEFAULT_LOCAL_STORE_PATH: &str = "trivia_local.json";
const DEFAULT_OFFLINE_BANK_DIR: &str = "data";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Settings of the leaderboard HTTP server.
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
    /// JSON file holding every category board.
    pub board_path: PathBuf,
    /// Seconds after which a silent presence client is forgotten.
    pub presence_ttl_secs: u64,
}

impl ServerConfig {
    /// Presence TTL as a [`Duration`].
    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            board_path: PathBuf::from(DEFAULT_BOARD_PATH),
            presence_ttl_secs: DEFAULT_PRESENCE_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Settings of the terminal quiz client.
pub struct ClientConfig {
    /// Base URL of the leaderboard server.
    pub leaderboard_url: String,
    /// Base URL of the Open Trivia DB API.
    pub trivia_url: String,
    /// JSON file backing the device-local store.
    pub local_store_path: PathBuf,
    /// Directory holding optional offline bank overlays.
    pub offline_bank_dir: PathBuf,
    /// Attempts made against the trivia API while it answers 429.
    pub max_fetch_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            leaderboard_url: DEFAULT_LEADERBOARD_URL.to_string(),
            trivia_url: DEFAULT_TRIVIA_URL.to_string(),
            local_store_path: PathBuf::from(DEFAULT_LOCAL_STORE_PATH),
            offline_bank_dir: PathBuf::from(DEFAULT_OFFLINE_BANK_DIR),
            max_fetch_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Server section.
    pub server: ServerConfig,
    /// Client section.
    pub client: ClientConfig,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults, then apply
    /// environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|err| {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to parse config; falling back to defaults"
                );
                Self::default()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        if let Some(port) = env::var(PORT_ENV)
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
        {
            config.server.port = port;
        }
        config
    }

    /// Parse a JSON document; absent fields keep their defaults.
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::parse("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.presence_ttl(), Duration::from_secs(45));
        assert_eq!(config.client.max_fetch_attempts, 3);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = AppConfig::parse(
            r#"{"server": {"port": 9100}, "client": {"trivia_url": "http://127.0.0.1:1"}}"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.board_path, PathBuf::from("leaderboard.json"));
        assert_eq!(config.client.trivia_url, "http://127.0.0.1:1");
        assert_eq!(config.client.leaderboard_url, "http://localhost:8000");
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(AppConfig::parse(r#"{"server": {"port": "high"}}"#).is_err());
    }
}
