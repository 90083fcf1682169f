//! Error types for webhook decoding, signature computation and event handling.

use crate::events::EventKind;
use thiserror::Error;

/// Reasons a delivery body could not be turned into a [`WebhookEnvelope`].
///
/// None of these are surfaced to the platform: the endpoint answers `200 OK`
/// for every variant and only logs the cause.
///
/// [`WebhookEnvelope`]: crate::events::WebhookEnvelope
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Body was empty, whitespace, `null` or an empty JSON object.
    #[error("Payload is empty")]
    Empty,

    /// Body was not valid JSON.
    #[error("Payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Body was valid JSON but not an object.
    #[error("Payload must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },
}

/// HMAC computation errors.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The secret could not be used as an HMAC-SHA256 key.
    #[error("Secret cannot be used as HMAC key: {message}")]
    InvalidKey { message: String },
}

/// Failure reported by an [`EventHandler`] implementation.
///
/// The dispatcher logs these and moves on to the next event; they never
/// change the HTTP response.
///
/// [`EventHandler`]: crate::handlers::EventHandler
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler could not process the event.
    #[error("{kind} handler failed: {message}")]
    Failed { kind: EventKind, message: String },
}

impl HandlerError {
    /// Convenience constructor for [`HandlerError::Failed`].
    pub fn failed(kind: EventKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    /// Kind of event whose handler failed.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Failed { kind, .. } => *kind,
        }
    }
}
