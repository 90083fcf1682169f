//! Minimal client for the Graph management API.
//!
//! Covers the three calls needed to register webhook subscriptions:
//! resolving the Instagram Business account linked to a Facebook page,
//! subscribing the app to fields, and reading the active subscriptions.

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;
use zeroize::Zeroizing;

/// Default Graph API host.
pub const DEFAULT_GRAPH_API_URL: &str = "https://graph.facebook.com";

/// Graph API version the subscription calls are made against.
pub const DEFAULT_GRAPH_API_VERSION: &str = "v18.0";

/// Outbound request timeout used unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Errors
// ============================================================================

/// Graph API call failures.
///
/// Display output never includes the request URL, which carries the access
/// token as a query parameter.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Transport failure (connect, TLS, timeout, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// Non-success status from the API
    #[error("Graph API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The page has no linked Instagram Business account
    #[error("No Instagram Business account is linked to the page: {body}")]
    AccountNotLinked { body: String },

    /// Success status but a body of an unexpected shape
    #[error("Unexpected Graph API response: {body}")]
    UnexpectedResponse { body: String },

    /// The configured base URL could not be parsed
    #[error("Invalid Graph API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl GraphError {
    fn http(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

// ============================================================================
// Access token
// ============================================================================

/// Page access token.
///
/// Zeroed on drop and redacted from `Debug`.
#[derive(Clone)]
pub struct AccessToken(Zeroizing<String>);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First 20 characters, for operator-facing output.
    pub fn preview(&self) -> String {
        let prefix: String = self.0.chars().take(20).collect();
        format!("{}...", prefix)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<REDACTED>)")
    }
}

// ============================================================================
// Client configuration
// ============================================================================

/// Settings for [`GraphClient`].
#[derive(Debug, Clone)]
pub struct GraphClientConfig {
    /// Scheme and host, without version
    pub base_url: String,

    /// Version path segment, e.g. `v18.0`
    pub api_version: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for GraphClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_API_URL.to_string(),
            api_version: DEFAULT_GRAPH_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("instagram-webhook-cli/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl GraphClientConfig {
    /// Set the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the API version segment.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct PageLookup {
    instagram_business_account: Option<AccountRef>,
}

#[derive(Debug, Deserialize)]
struct AccountRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SubscribeResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct SubscribedAppsResponse {
    #[serde(default)]
    data: Vec<SubscribedApp>,
}

#[derive(Debug, Deserialize)]
struct SubscribedApp {
    #[serde(default)]
    subscribed_fields: Vec<String>,
}

// ============================================================================
// Client
// ============================================================================

/// Graph API client.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: Url,
    api_version: String,
}

impl GraphClient {
    pub fn new(config: GraphClientConfig) -> Result<Self, GraphError> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(GraphError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(GraphError::http)?;

        Ok(Self {
            http,
            base_url,
            api_version: config.api_version,
        })
    }

    /// Resolve the Instagram Business account linked to a Facebook page.
    #[instrument(skip(self, token))]
    pub async fn get_instagram_account_id(
        &self,
        page_id: &str,
        token: &AccessToken,
    ) -> Result<String, GraphError> {
        let url = self.endpoint(&[page_id])?;
        let request = self.http.get(url).query(&[
            ("fields", "instagram_business_account"),
            ("access_token", token.expose()),
        ]);

        let body = send(request).await?;
        let lookup: PageLookup =
            serde_json::from_str(&body).map_err(|_| GraphError::UnexpectedResponse {
                body: body.clone(),
            })?;

        match lookup.instagram_business_account {
            Some(account) if !account.id.is_empty() => Ok(account.id),
            _ => Err(GraphError::AccountNotLinked { body }),
        }
    }

    /// Subscribe the app to `fields` on the given Instagram account.
    #[instrument(skip(self, token))]
    pub async fn subscribe(
        &self,
        account_id: &str,
        token: &AccessToken,
        fields: &[String],
    ) -> Result<(), GraphError> {
        let url = self.endpoint(&[account_id, "subscribed_apps"])?;
        let subscribed_fields = fields.join(",");
        let request = self.http.post(url).query(&[
            ("subscribed_fields", subscribed_fields.as_str()),
            ("access_token", token.expose()),
        ]);

        let body = send(request).await?;
        let response: Option<SubscribeResponse> = serde_json::from_str(&body).ok();

        match response {
            Some(SubscribeResponse { success: true }) => Ok(()),
            _ => Err(GraphError::UnexpectedResponse { body }),
        }
    }

    /// Fields the app is currently subscribed to. Empty when there is no
    /// subscription.
    #[instrument(skip(self, token))]
    pub async fn active_subscriptions(
        &self,
        account_id: &str,
        token: &AccessToken,
    ) -> Result<Vec<String>, GraphError> {
        let url = self.endpoint(&[account_id, "subscribed_apps"])?;
        let request = self
            .http
            .get(url)
            .query(&[("access_token", token.expose())]);

        let body = send(request).await?;
        let response: SubscribedAppsResponse =
            serde_json::from_str(&body).map_err(|_| GraphError::UnexpectedResponse {
                body: body.clone(),
            })?;

        Ok(response
            .data
            .into_iter()
            .next()
            .map(|app| app.subscribed_fields)
            .unwrap_or_default())
    }

    /// `{base}/{version}/{segments…}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GraphError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| GraphError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            path.pop_if_empty().push(&self.api_version);
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }
}

/// Send the request and return the body of a 2xx response.
async fn send(request: reqwest::RequestBuilder) -> Result<String, GraphError> {
    let response = request.send().await.map_err(GraphError::http)?;
    let status = response.status();
    let body = response.text().await.map_err(GraphError::http)?;

    debug!(status = status.as_u16(), body_len = body.len(), "Graph API responded");

    if !status.is_success() {
        return Err(GraphError::Api {
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
