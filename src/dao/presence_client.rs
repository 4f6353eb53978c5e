//! Heartbeat client for the presence endpoint. Presence is cosmetic, so every failure is
//! logged and turned into `None`.

use std::sync::Arc;

use reqwest::{Client, StatusCode, header};
use tracing::debug;

use crate::dto::presence::{PresenceAck, PresenceCount, PresencePing};

const PRESENCE_PATH: &str = "/api/presence";

/// Client for `GET`/`POST /api/presence`.
#[derive(Clone)]
pub struct PresenceClient {
    client: Client,
    base_url: Arc<str>,
    client_id: Arc<str>,
}

impl PresenceClient {
    /// Client announcing `client_id` to the server at `base_url`.
    pub fn new(client: Client, base_url: &str, client_id: &str) -> Self {
        Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            client_id: Arc::from(client_id),
        }
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, PRESENCE_PATH)
    }

    /// Send a heartbeat and return the online count reported by the server.
    pub async fn ping(&self, name: &str) -> Option<usize> {
        let body = PresencePing {
            id: Some(self.client_id.to_string()),
            name: Some(name.to_string()),
        };
        let response = self.client.post(self.url()).json(&body).send().await;
        match response {
            Ok(response) if response.status() == StatusCode::OK => response
                .json::<PresenceAck>()
                .await
                .map(|ack| ack.online)
                .map_err(|err| debug!(error = %err, "presence ack undecodable"))
                .ok(),
            Ok(response) => {
                debug!(status = %response.status(), "presence ping rejected");
                None
            }
            Err(err) => {
                debug!(error = %err, "presence ping failed");
                None
            }
        }
    }

    /// Number of clients currently online.
    pub async fn online_count(&self) -> Option<usize> {
        let response = self
            .client
            .get(self.url())
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await;
        match response {
            Ok(response) if response.status() == StatusCode::OK => response
                .json::<PresenceCount>()
                .await
                .map(|count| count.online)
                .map_err(|err| debug!(error = %err, "presence count undecodable"))
                .ok(),
            Ok(response) => {
                debug!(status = %response.status(), "presence count rejected");
                None
            }
            Err(err) => {
                debug!(error = %err, "presence count failed");
                None
            }
        }
    }
}
