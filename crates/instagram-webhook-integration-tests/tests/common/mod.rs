//! Common test utilities for instagram-webhook integration tests
//!
//! This module provides:
//! - A recording [`EventHandler`] for asserting what was dispatched
//! - A server harness bound to an ephemeral local port
//! - Payload and signature helpers

use instagram_webhook_api::{create_router, AppState, ServiceConfig};
use instagram_webhook_core::{
    compute_signature, CommentValue, EventContext, EventHandler, EventKind, HandlerError, MentionValue,
    MessagePayload, PostbackPayload, ReactionPayload, ReadPayload, StoryInsightsValue,
    SIGNATURE_HEADER,
};
use std::sync::{Arc, Mutex};

pub const VERIFY_TOKEN: &str = "integration-verify-token";
pub const APP_SECRET: &str = "integration-app-secret";

// ============================================================================
// Recording handler
// ============================================================================

/// One handler invocation, reduced to the fields the tests check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Message { sender: String, text: String },
    Postback { sender: String, payload: String },
    Reaction { sender: String, action: String },
    Read { sender: String },
    Comment { id: String, username: String, text: String },
    Mention { media_id: String },
    StoryInsights { media_id: String, impressions: i64 },
}

/// Handler that records every call and fails comments when asked to.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    calls: Arc<Mutex<Vec<Recorded>>>,
    fail_comments: bool,
}

#[allow(dead_code)]
impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_comments() -> Self {
        Self {
            fail_comments: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Recorded) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl EventHandler for RecordingHandler {
    async fn handle_message(
        &self,
        context: &EventContext,
        message: &MessagePayload,
    ) -> Result<(), HandlerError> {
        self.record(Recorded::Message {
            sender: context.sender().to_string(),
            text: message.text.clone(),
        });
        Ok(())
    }

    async fn handle_postback(
        &self,
        context: &EventContext,
        postback: &PostbackPayload,
    ) -> Result<(), HandlerError> {
        self.record(Recorded::Postback {
            sender: context.sender().to_string(),
            payload: postback.payload.clone().unwrap_or_default(),
        });
        Ok(())
    }

    async fn handle_reaction(
        &self,
        context: &EventContext,
        reaction: &ReactionPayload,
    ) -> Result<(), HandlerError> {
        self.record(Recorded::Reaction {
            sender: context.sender().to_string(),
            action: reaction.action.clone().unwrap_or_default(),
        });
        Ok(())
    }

    async fn handle_read(
        &self,
        context: &EventContext,
        _read: &ReadPayload,
    ) -> Result<(), HandlerError> {
        self.record(Recorded::Read {
            sender: context.sender().to_string(),
        });
        Ok(())
    }

    async fn handle_comment(&self, comment: &CommentValue) -> Result<(), HandlerError> {
        self.record(Recorded::Comment {
            id: comment.id.clone().unwrap_or_default(),
            username: comment.username().to_string(),
            text: comment.text.clone().unwrap_or_default(),
        });
        if self.fail_comments {
            return Err(HandlerError::failed(EventKind::Comment, "comment handler failed"));
        }
        Ok(())
    }

    async fn handle_mention(&self, mention: &MentionValue) -> Result<(), HandlerError> {
        self.record(Recorded::Mention {
            media_id: mention.media_id.clone().unwrap_or_default(),
        });
        Ok(())
    }

    async fn handle_story_insights(
        &self,
        insights: &StoryInsightsValue,
    ) -> Result<(), HandlerError> {
        self.record(Recorded::StoryInsights {
            media_id: insights.media_id.clone().unwrap_or_default(),
            impressions: insights.impressions.unwrap_or_default(),
        });
        Ok(())
    }
}

// ============================================================================
// Server harness
// ============================================================================

/// Router served on `127.0.0.1:<ephemeral>` for the life of the test.
pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST `body` with a valid signature for [`APP_SECRET`].
    pub async fn post_signed(&self, body: &str) -> reqwest::Response {
        self.client
            .post(self.url("/webhook"))
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, sign(body))
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }
}

/// Configuration with test credentials and the given secret.
pub fn test_config(app_secret: &str) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.instagram.verify_token = VERIFY_TOKEN.to_string();
    config.instagram.app_secret = app_secret.to_string();
    config
}

/// Serve the router for `config` with `handler` on an ephemeral port.
pub async fn spawn_server(config: ServiceConfig, handler: Arc<dyn EventHandler>) -> TestServer {
    let app = create_router(AppState::new(config, handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", address),
        client: reqwest::Client::new(),
    }
}

/// `sha256=<hex>` signature of `body` under [`APP_SECRET`].
pub fn sign(body: &str) -> String {
    compute_signature(body.as_bytes(), APP_SECRET).unwrap()
}

/// Comment delivery used across tests.
#[allow(dead_code)]
pub fn comment_payload() -> String {
    serde_json::json!({
        "object": "instagram",
        "entry": [{
            "id": "17841400000000000",
            "time": 1700000000,
            "changes": [{
                "field": "comments",
                "value": { "id": "c1", "text": "hi", "from": { "username": "bob" } }
            }]
        }]
    })
    .to_string()
}
