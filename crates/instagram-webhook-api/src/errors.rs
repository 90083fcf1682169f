//! Error types for the HTTP service

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

/// Webhook endpoint rejections.
///
/// Both variants map to `403 Forbidden` with a fixed plain-text body. The
/// body never says which check failed beyond the variant's fixed text.
/// Everything that is not an authentication failure is answered with
/// `200 OK` by the delivery handler itself and never becomes an error here.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// Delivery signature missing or not matching the app secret
    #[error("Invalid signature")]
    InvalidSignature,

    /// Handshake with the wrong mode or verify token
    #[error("Verification failed")]
    VerificationFailed,
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::InvalidSignature => {
                warn!("Rejecting delivery with invalid signature");
                StatusCode::FORBIDDEN
            }
            Self::VerificationFailed => {
                warn!("Rejecting subscription handshake");
                StatusCode::FORBIDDEN
            }
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl ServiceError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),
}
