use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::dto::validation::validate_label;

/// Heartbeat body sent by clients while they are on the online screens.
#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct PresencePing {
    /// Stable per-device client identifier.
    #[serde(default)]
    #[validate(custom(function = "validate_label"))]
    pub id: Option<String>,
    /// Display name of the player, informational only.
    #[serde(default)]
    pub name: Option<String>,
}

/// Optional `?id=` used when the heartbeat carries no body.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PresenceQuery {
    /// Client identifier.
    #[serde(default)]
    pub id: Option<String>,
}

/// Number of clients seen within the presence TTL.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PresenceCount {
    /// Active clients.
    pub online: usize,
}

/// Acknowledgement of a heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PresenceAck {
    /// Always true on success.
    pub ok: bool,
    /// Active clients including the caller.
    pub online: usize,
}
