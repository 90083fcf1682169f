//! Operator-facing subscription procedure.
//!
//! Runs the Graph API calls strictly in sequence and narrates each step to
//! the given writer. The first failing step stops the procedure.

use crate::graph::{AccessToken, GraphClient, GraphError};
use crate::CliError;
use std::io::Write;
use tracing::info;

/// Fields registered when none are given on the command line.
pub const DEFAULT_SUBSCRIBED_FIELDS: &[&str] = &[
    "messages",
    "comments",
    "mentions",
    "messaging_postbacks",
    "messaging_handover",
    "message_reactions",
    "messaging_seen",
];

const RULE: &str = "============================================================";

/// What a completed `subscribe` run established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionReport {
    pub account_id: String,
    pub active_fields: Vec<String>,
}

/// Registers and inspects the app's webhook subscription for one page.
#[derive(Debug)]
pub struct SubscriptionManager {
    client: GraphClient,
    page_id: String,
    token: AccessToken,
    webhook_url: Option<String>,
}

impl SubscriptionManager {
    pub fn new(client: GraphClient, page_id: impl Into<String>, token: AccessToken) -> Self {
        Self {
            client,
            page_id: page_id.into(),
            token,
            webhook_url: None,
        }
    }

    /// Public webhook URL shown in the closing instructions.
    pub fn with_webhook_url(mut self, webhook_url: Option<String>) -> Self {
        self.webhook_url = webhook_url;
        self
    }

    /// Resolve the account, subscribe `fields`, then read back what is active.
    pub async fn run<W: Write>(
        &self,
        fields: &[String],
        out: &mut W,
    ) -> Result<SubscriptionReport, CliError> {
        self.write_header(out, "INSTAGRAM WEBHOOK SUBSCRIPTION SETUP")?;

        banner(out, "STEP 1: Resolve Instagram account ID")?;
        let account_id = self.resolve_account(out).await?;

        banner(out, "STEP 2: Subscribe to fields")?;
        writeln!(out, "Subscribing to fields: {}...", fields.join(", "))?;
        match self
            .client
            .subscribe(&account_id, &self.token, fields)
            .await
        {
            Ok(()) => {
                writeln!(out, "✅ Subscription created")?;
                info!(account_id = %account_id, fields = fields.len(), "Subscription created");
            }
            Err(e) => {
                match &e {
                    GraphError::UnexpectedResponse { body } => {
                        writeln!(out, "⚠️  Unexpected response: {}", body)?;
                    }
                    other => writeln!(out, "❌ Subscription failed: {}", other)?,
                }
                writeln!(out, "\n❌ Subscription failed")?;
                return Err(e.into());
            }
        }

        banner(out, "STEP 3: Verify active subscriptions")?;
        let active_fields = self.read_active(&account_id, out).await?;

        banner(out, "✅ SETUP COMPLETE")?;
        writeln!(out, "\nSummary:")?;
        writeln!(out, "   Instagram Account ID: {}", account_id)?;
        writeln!(out, "   Subscribed fields: {}", active_fields.len())?;
        writeln!(out, "   List: {}", active_fields.join(", "))?;

        writeln!(out, "\nNext steps:")?;
        writeln!(out, "   1. Webhook URL configured in the Meta app dashboard:")?;
        writeln!(
            out,
            "      {}",
            self.webhook_url
                .as_deref()
                .unwrap_or("https://<your-public-host>/webhook")
        )?;
        writeln!(out, "   2. Send a direct message to the Instagram account")?;
        writeln!(out, "   3. Watch the webhook service logs for the delivery")?;

        Ok(SubscriptionReport {
            account_id,
            active_fields,
        })
    }

    /// Resolve the account and list active fields without changing anything.
    pub async fn status<W: Write>(&self, out: &mut W) -> Result<SubscriptionReport, CliError> {
        self.write_header(out, "INSTAGRAM WEBHOOK SUBSCRIPTION STATUS")?;

        banner(out, "STEP 1: Resolve Instagram account ID")?;
        let account_id = self.resolve_account(out).await?;

        banner(out, "STEP 2: Read active subscriptions")?;
        let active_fields = self.read_active(&account_id, out).await?;

        Ok(SubscriptionReport {
            account_id,
            active_fields,
        })
    }

    fn write_header<W: Write>(&self, out: &mut W, title: &str) -> Result<(), CliError> {
        writeln!(out, "{}", RULE)?;
        writeln!(out, "{}", title)?;
        writeln!(out, "{}", RULE)?;
        writeln!(out, "\nSettings:")?;
        writeln!(out, "   Page ID: {}", self.page_id)?;
        writeln!(out, "   Token: {}", self.token.preview())?;
        Ok(())
    }

    async fn resolve_account<W: Write>(&self, out: &mut W) -> Result<String, CliError> {
        writeln!(out, "Looking up Instagram Business Account ID...")?;
        match self
            .client
            .get_instagram_account_id(&self.page_id, &self.token)
            .await
        {
            Ok(account_id) => {
                writeln!(out, "✅ Instagram Account ID: {}", account_id)?;
                Ok(account_id)
            }
            Err(e) => {
                writeln!(out, "❌ Error: {}", e)?;
                writeln!(out, "\n💡 Make sure that:")?;
                writeln!(
                    out,
                    "   1. The Facebook page is connected to an Instagram Business account"
                )?;
                writeln!(
                    out,
                    "   2. The page access token has the required permissions"
                )?;
                writeln!(out, "\n❌ Could not resolve the Instagram Account ID")?;
                Err(e.into())
            }
        }
    }

    async fn read_active<W: Write>(
        &self,
        account_id: &str,
        out: &mut W,
    ) -> Result<Vec<String>, CliError> {
        writeln!(out, "Checking active subscriptions...")?;
        let active = match self
            .client
            .active_subscriptions(account_id, &self.token)
            .await
        {
            Ok(active) => active,
            Err(e) => {
                writeln!(out, "❌ Could not read subscriptions: {}", e)?;
                return Err(e.into());
            }
        };

        if active.is_empty() {
            writeln!(out, "⚠️  No active subscriptions")?;
        } else {
            writeln!(out, "✅ Subscribed fields: {}", active.join(", "))?;
        }
        Ok(active)
    }
}

fn banner<W: Write>(out: &mut W, title: &str) -> Result<(), CliError> {
    writeln!(out, "\n{}", RULE)?;
    writeln!(out, "{}", title)?;
    writeln!(out, "{}", RULE)?;
    Ok(())
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
