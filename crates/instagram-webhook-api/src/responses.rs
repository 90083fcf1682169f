//! Response types and query parameters for the API.

use serde::{Deserialize, Serialize};

// ============================================================================
// Response Types
// ============================================================================

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service: String,
    pub status: String,
    pub version: String,
    pub endpoints: EndpointsDescriptor,
    pub events_supported: Vec<String>,
    pub environment: String,
    pub url: Option<String>,
}

/// Route summary inside [`ServiceDescriptor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsDescriptor {
    pub health: String,
    pub webhook_validation: String,
    pub webhook_events: String,
}

impl Default for EndpointsDescriptor {
    fn default() -> Self {
        Self {
            health: "/health".to_string(),
            webhook_validation: "/webhook (GET)".to_string(),
            webhook_events: "/webhook (POST)".to_string(),
        }
    }
}

/// Event families the receiver dispatches, as advertised by `GET /`.
pub const EVENTS_SUPPORTED: [&str; 6] = [
    "messages",
    "comments",
    "mentions",
    "postbacks",
    "reactions",
    "story_insights",
];

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

// ============================================================================
// Query Parameters
// ============================================================================

/// Query string of the subscription handshake
/// (`GET /webhook?hub.mode=…&hub.verify_token=…&hub.challenge=…`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerificationParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,

    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,

    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}
