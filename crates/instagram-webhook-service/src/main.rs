//! # Instagram Webhook Service
//!
//! Binary entry point for the Instagram webhook receiver.
//!
//! This executable:
//! - Loads configuration from files and the environment
//! - Initializes logging
//! - Starts the HTTP server from instagram-webhook-api with the logging
//!   event handler
//!
//! Exit codes: 1 bind failure, 2 server failure, 3 bad configuration.

use instagram_webhook_api::{start_server, LoggingConfig, ServiceConfig};
use instagram_webhook_core::LoggingEventHandler;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Configuration is loaded before logging so the log format can come from
    // it. Load errors are reported once the subscriber exists.
    let loaded = ServiceConfig::load();
    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging);

    info!("Starting Instagram webhook service");

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(
                error = %e,
                "Could not load service configuration; aborting. \
                 Fix the configuration and restart."
            );
            std::process::exit(3);
        }
    };

    if let Err(e) = config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    log_startup_banner(&config);

    if let Err(e) = start_server(config, Arc::new(LoggingEventHandler)).await {
        error!("Failed to start server: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(&logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Filter used when `RUST_LOG` is not set.
fn default_filter(level: &str) -> String {
    format!(
        "instagram_webhook_service={level},instagram_webhook_api={level},\
         instagram_webhook_core={level},tower_http=debug"
    )
}

fn log_startup_banner(config: &ServiceConfig) {
    let instagram = &config.instagram;

    info!(
        host = %config.server.host,
        port = config.server.port,
        environment = %config.service.environment,
        "Instagram webhook server starting on port {}",
        config.server.port
    );
    info!("Verify token: {}", instagram.verify_token_preview());
    if instagram.app_secret.is_empty() {
        info!("App secret: not configured (signature validation disabled)");
    } else {
        info!("App secret: configured");
    }

    if instagram.uses_default_verify_token() {
        warn!(
            "Using the built-in default verify token; set INSTAGRAM_VERIFY_TOKEN \
             before registering the webhook"
        );
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
