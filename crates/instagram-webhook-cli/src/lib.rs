//! # Instagram Webhook CLI
//!
//! Operator utility that registers the app's Instagram webhook subscriptions
//! through the Graph API.
//!
//! Commands:
//! - `subscribe`: resolve the Instagram account, subscribe fields, verify
//! - `status`: resolve the Instagram account and list active fields
//!
//! Credentials come from flags, the environment, or a `.env` file in the
//! working directory.

use clap::{Parser, Subcommand};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod graph;
pub mod subscription;

pub use graph::{AccessToken, GraphClient, GraphClientConfig, GraphError};
pub use subscription::{SubscriptionManager, SubscriptionReport, DEFAULT_SUBSCRIBED_FIELDS};

// ============================================================================
// CLI Structure
// ============================================================================

/// Instagram webhook CLI - manage Graph API webhook subscriptions
#[derive(Parser)]
#[command(name = "instagram-webhook-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Register Instagram webhook subscriptions through the Graph API")]
pub struct Cli {
    /// Facebook page connected to the Instagram Business account
    #[arg(long, global = true, env = "INSTAGRAM_PAGE_ID")]
    pub page_id: Option<String>,

    /// Page access token
    #[arg(long, global = true, env = "INSTAGRAM_PAGE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Graph API base URL
    #[arg(long, global = true, default_value = graph::DEFAULT_GRAPH_API_URL)]
    pub graph_api_url: String,

    /// Graph API version
    #[arg(long, global = true, default_value = graph::DEFAULT_GRAPH_API_VERSION)]
    pub graph_api_version: String,

    /// Timeout for each Graph API call, in seconds
    #[arg(long, global = true, default_value = "10")]
    pub timeout_seconds: u64,

    /// Public webhook URL, shown in the closing instructions
    #[arg(long, global = true, env = "INSTAGRAM_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Logging level
    #[arg(short, long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Subscribe the app to webhook fields and verify the result
    Subscribe {
        /// Fields to subscribe, comma separated
        #[arg(
            long,
            value_delimiter = ',',
            default_values_t = DEFAULT_SUBSCRIBED_FIELDS.iter().map(|f| f.to_string())
        )]
        fields: Vec<String>,
    },

    /// Show the fields the app is currently subscribed to
    Status,
}

// ============================================================================
// Errors
// ============================================================================

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Graph API error: {0}")]
    Graph(#[from] GraphError),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("Console output failed: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration { .. } => 1,
            Self::Graph(_) => 2,
            Self::CommandFailed { .. } | Self::Io(_) => 3,
        }
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Parse arguments, initialize logging and run the selected command.
pub async fn run_cli() -> Result<(), CliError> {
    // Missing .env is normal; real environment variables still apply.
    let dotenv = dotenvy::dotenv().ok();

    let cli = Cli::parse();
    initialize_logging(&cli.log_level);

    if let Some(path) = dotenv {
        debug!(path = %path.display(), "Loaded environment from file");
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(cli, &mut out).await
}

/// Run the command described by `cli`, narrating to `out`.
pub async fn execute<W: Write>(cli: Cli, out: &mut W) -> Result<(), CliError> {
    let settings = Settings::from_cli(&cli)?;

    let client = GraphClient::new(
        GraphClientConfig::default()
            .with_base_url(cli.graph_api_url)
            .with_api_version(cli.graph_api_version)
            .with_timeout(settings.timeout),
    )
    .map_err(|e| CliError::Configuration {
        message: e.to_string(),
    })?;

    let manager = SubscriptionManager::new(client, settings.page_id, settings.token)
        .with_webhook_url(cli.webhook_url);

    match cli.command {
        Commands::Subscribe { fields } => {
            let fields: Vec<String> = fields
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
            if fields.is_empty() {
                return Err(CliError::CommandFailed {
                    message: "no subscription fields given".to_string(),
                });
            }

            info!(fields = fields.len(), "Running subscription setup");
            manager.run(&fields, out).await?;
        }
        Commands::Status => {
            info!("Reading subscription status");
            manager.status(out).await?;
        }
    }

    Ok(())
}

/// Validated credentials and limits.
struct Settings {
    page_id: String,
    token: AccessToken,
    timeout: Duration,
}

impl Settings {
    fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let token = non_empty(cli.access_token.as_deref()).ok_or_else(|| missing(
            "INSTAGRAM_PAGE_ACCESS_TOKEN",
            "--access-token",
        ))?;
        let page_id = non_empty(cli.page_id.as_deref())
            .ok_or_else(|| missing("INSTAGRAM_PAGE_ID", "--page-id"))?;

        if cli.timeout_seconds == 0 {
            return Err(CliError::Configuration {
                message: "--timeout-seconds must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            page_id: page_id.to_string(),
            token: AccessToken::new(token),
            timeout: Duration::from_secs(cli.timeout_seconds),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn missing(variable: &str, flag: &str) -> CliError {
    CliError::Configuration {
        message: format!(
            "{variable} is not set. Add it to the .env file in the working directory \
             (e.g. {variable}=...) or pass {flag}"
        ),
    }
}

/// Logs go to stderr so stdout carries only the narration.
fn initialize_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("instagram_webhook_cli={level}").into());

    // A second initialization (tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
