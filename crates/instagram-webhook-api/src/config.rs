//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use serde::Deserialize;
use tracing::info;

/// Verify token used when none is configured.
///
/// Anyone who knows it can complete the subscription handshake, so the
/// service warns at startup while it is in use.
pub const DEFAULT_VERIFY_TOKEN: &str = "meu_token_secreto_123";

/// Prefix of structured environment overrides, e.g. `IGW__SERVER__PORT`.
pub const ENV_PREFIX: &str = "IGW";

/// Environment variable naming an extra configuration file.
pub const CONFIG_FILE_ENV: &str = "IGW_CONFIG_FILE";

/// Service configuration
///
/// Every field carries a serde default, so an empty environment yields a
/// runnable configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Platform credentials
    pub instagram: InstagramConfig,

    /// Values reported by the descriptor and health endpoints
    pub service: ServiceInfoConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Upper bound in seconds on processing one delivery
    pub timeout_seconds: u64,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Deliveries larger than this many bytes are acknowledged but not processed
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            timeout_seconds: 30,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Handshake token and delivery signing secret.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct InstagramConfig {
    /// Shared token echoed back by the platform during the handshake
    pub verify_token: String,

    /// App secret used to sign deliveries; empty disables verification
    pub app_secret: String,
}

impl InstagramConfig {
    /// Whether the well-known placeholder token is still in use.
    pub fn uses_default_verify_token(&self) -> bool {
        self.verify_token == DEFAULT_VERIFY_TOKEN
    }

    /// First ten characters of the verify token, for the startup banner.
    pub fn verify_token_preview(&self) -> String {
        let preview: String = self.verify_token.chars().take(10).collect();
        format!("{}...", preview)
    }
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            verify_token: DEFAULT_VERIFY_TOKEN.to_string(),
            app_secret: String::new(),
        }
    }
}

impl std::fmt::Debug for InstagramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstagramConfig")
            .field("verify_token", &"<REDACTED>")
            .field(
                "app_secret",
                &if self.app_secret.is_empty() {
                    "<EMPTY>"
                } else {
                    "<REDACTED>"
                },
            )
            .finish()
    }
}

/// Identity reported by `GET /` and `GET /health`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceInfoConfig {
    /// Short service id, reported by the health endpoint
    pub name: String,

    /// Human-readable name, reported by the descriptor
    pub display_name: String,

    /// Deployment environment label
    pub environment: String,

    /// Public URL the platform delivers to
    pub public_url: Option<String>,
}

impl Default for ServiceInfoConfig {
    fn default() -> Self {
        Self {
            name: "instagram-webhook".to_string(),
            display_name: "Instagram Webhook Server".to_string(),
            environment: "development".to_string(),
            public_url: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from files and the environment.
    ///
    /// Sources, later overriding earlier:
    ///  1. built-in defaults
    ///  2. `/etc/instagram-webhook/service.yaml`
    ///  3. `./config/service.yaml`
    ///  4. the file named by `IGW_CONFIG_FILE` (must exist when set)
    ///  5. `IGW__SECTION__KEY` environment variables
    ///  6. the flat variables `PORT`, `INSTAGRAM_VERIFY_TOKEN`, `INSTAGRAM_APP_SECRET`
    ///
    /// Missing optional files are fine. A malformed file or a value that
    /// cannot be coerced to its field type is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("/etc/instagram-webhook/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::with_name("config/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            );

        if let Ok(explicit_path) = std::env::var(CONFIG_FILE_ENV) {
            if !explicit_path.is_empty() {
                builder = builder.add_source(
                    config::File::with_name(&explicit_path)
                        .required(true)
                        .format(config::FileFormat::Yaml),
                );
                info!(path = %explicit_path, "Loading configuration from explicit path");
            }
        }

        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .set_override_option("server.port", non_empty_env("PORT"))?
            .set_override_option("instagram.verify_token", non_empty_env("INSTAGRAM_VERIFY_TOKEN"))?
            .set_override_option("instagram.app_secret", std::env::var("INSTAGRAM_APP_SECRET").ok())?
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be greater than 0".to_string(),
            });
        }

        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be greater than 0".to_string(),
            });
        }

        if self.server.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "server.timeout_seconds must be greater than 0".to_string(),
            });
        }

        if self.instagram.verify_token.is_empty() {
            return Err(ConfigError::Invalid {
                message: "instagram.verify_token must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
