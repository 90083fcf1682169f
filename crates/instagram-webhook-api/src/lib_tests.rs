//! Tests for the HTTP routes.

use super::*;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use instagram_webhook_core::{
    compute_signature, CommentValue, EventContext, EventKind, HandlerError, MentionValue,
    MessagePayload, PostbackPayload, ReactionPayload, ReadPayload, StoryInsightsValue,
};
use std::io;
use std::sync::Mutex;
use tower::ServiceExt;

const VERIFY_TOKEN: &str = "test-verify-token";
const APP_SECRET: &str = "test-app-secret";

// ============================================================================
// Mock EventHandler
// ============================================================================

/// Test double that records the kind of every event it receives.
///
/// Comments fail with an error and mentions panic when the corresponding
/// flag is set.
#[derive(Default)]
struct MockEventHandler {
    calls: Mutex<Vec<EventKind>>,
    fail_comments: bool,
    panic_on_mentions: bool,
    stall_messages: bool,
}

impl MockEventHandler {
    fn calls(&self) -> Vec<EventKind> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, kind: EventKind) {
        self.calls.lock().unwrap().push(kind);
    }
}

#[async_trait]
impl EventHandler for MockEventHandler {
    async fn handle_message(
        &self,
        _context: &EventContext,
        _message: &MessagePayload,
    ) -> Result<(), HandlerError> {
        self.record(EventKind::Message);
        if self.stall_messages {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        }
        Ok(())
    }

    async fn handle_postback(
        &self,
        _context: &EventContext,
        _postback: &PostbackPayload,
    ) -> Result<(), HandlerError> {
        self.record(EventKind::Postback);
        Ok(())
    }

    async fn handle_reaction(
        &self,
        _context: &EventContext,
        _reaction: &ReactionPayload,
    ) -> Result<(), HandlerError> {
        self.record(EventKind::Reaction);
        Ok(())
    }

    async fn handle_read(
        &self,
        _context: &EventContext,
        _read: &ReadPayload,
    ) -> Result<(), HandlerError> {
        self.record(EventKind::Read);
        Ok(())
    }

    async fn handle_comment(&self, _comment: &CommentValue) -> Result<(), HandlerError> {
        self.record(EventKind::Comment);
        if self.fail_comments {
            return Err(HandlerError::failed(EventKind::Comment, "database down"));
        }
        Ok(())
    }

    async fn handle_mention(&self, _mention: &MentionValue) -> Result<(), HandlerError> {
        self.record(EventKind::Mention);
        if self.panic_on_mentions {
            panic!("mention handler bug");
        }
        Ok(())
    }

    async fn handle_story_insights(
        &self,
        _insights: &StoryInsightsValue,
    ) -> Result<(), HandlerError> {
        self.record(EventKind::StoryInsights);
        Ok(())
    }
}

// ============================================================================
// Test helpers
// ============================================================================

fn test_config(app_secret: &str) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.instagram.verify_token = VERIFY_TOKEN.to_string();
    config.instagram.app_secret = app_secret.to_string();
    config.service.environment = "test".to_string();
    config.service.public_url = Some("https://hooks.example.com".to_string());
    config
}

fn test_app(app_secret: &str, handler: Arc<MockEventHandler>) -> Router {
    create_router(AppState::new(test_config(app_secret), handler))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delivery(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("X-Hub-Signature-256", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

const MESSAGE_DELIVERY: &str = r#"{"object":"instagram","entry":[{"id":"1","time":1,"messaging":[{"sender":{"id":"a"},"recipient":{"id":"b"},"timestamp":1,"message":{"mid":"m","text":"hi"}}]}]}"#;

// ============================================================================
// Informational endpoints
// ============================================================================

/// Verify that GET / describes the service and its routes.
#[tokio::test]
async fn test_descriptor_lists_routes_and_events() {
    let app = test_app("", Arc::new(MockEventHandler::default()));

    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["service"], "Instagram Webhook Server");
    assert_eq!(body["status"], "running");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["endpoints"]["health"], "/health");
    assert_eq!(body["endpoints"]["webhook_validation"], "/webhook (GET)");
    assert_eq!(body["endpoints"]["webhook_events"], "/webhook (POST)");
    assert_eq!(body["environment"], "test");
    assert_eq!(body["url"], "https://hooks.example.com");
    let events: Vec<&str> = body["events_supported"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(events, EVENTS_SUPPORTED.to_vec());
}

/// Verify that GET /health reports healthy with a parseable timestamp.
#[tokio::test]
async fn test_health_reports_healthy() {
    let app = test_app("", Arc::new(MockEventHandler::default()));

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "instagram-webhook");
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

// ============================================================================
// Handshake
// ============================================================================

/// Verify that a correct handshake echoes the challenge verbatim.
#[tokio::test]
async fn test_handshake_with_valid_token_echoes_challenge() {
    let app = test_app("", Arc::new(MockEventHandler::default()));

    let response = app
        .oneshot(get(&format!(
            "/webhook?hub.mode=subscribe&hub.verify_token={}&hub.challenge=1158201444",
            VERIFY_TOKEN
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "1158201444");
}

/// Verify that the challenge is returned after URL decoding and nothing else.
#[tokio::test]
async fn test_handshake_echoes_decoded_challenge() {
    let app = test_app("", Arc::new(MockEventHandler::default()));

    let response = app
        .oneshot(get(&format!(
            "/webhook?hub.mode=subscribe&hub.verify_token={}&hub.challenge=abc%20def",
            VERIFY_TOKEN
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "abc def");
}

/// Verify that a wrong token is rejected with the fixed body.
#[tokio::test]
async fn test_handshake_with_wrong_token_is_forbidden() {
    let app = test_app("", Arc::new(MockEventHandler::default()));

    let response = app
        .oneshot(get(
            "/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=123",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "Verification failed");
}

/// Verify that a mode other than `subscribe` is rejected.
#[tokio::test]
async fn test_handshake_with_wrong_mode_is_forbidden() {
    let app = test_app("", Arc::new(MockEventHandler::default()));

    let response = app
        .oneshot(get(&format!(
            "/webhook?hub.mode=unsubscribe&hub.verify_token={}&hub.challenge=123",
            VERIFY_TOKEN
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

/// Verify that a handshake without parameters is rejected.
#[tokio::test]
async fn test_handshake_without_parameters_is_forbidden() {
    let app = test_app("", Arc::new(MockEventHandler::default()));

    let response = app.oneshot(get("/webhook")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "Verification failed");
}

/// Verify that a token differing only by case is rejected.
#[tokio::test]
async fn test_handshake_token_match_is_exact() {
    let app = test_app("", Arc::new(MockEventHandler::default()));

    let response = app
        .oneshot(get(&format!(
            "/webhook?hub.mode=subscribe&hub.verify_token={}&hub.challenge=1",
            VERIFY_TOKEN.to_uppercase()
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

/// Verify that a matching handshake without a challenge returns an empty body.
#[tokio::test]
async fn test_handshake_without_challenge_returns_empty_body() {
    let app = test_app("", Arc::new(MockEventHandler::default()));

    let response = app
        .oneshot(get(&format!(
            "/webhook?hub.mode=subscribe&hub.verify_token={}",
            VERIFY_TOKEN
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "");
}

// ============================================================================
// Delivery: signature gate
// ============================================================================

/// Verify that a correctly signed delivery is dispatched and acknowledged.
#[tokio::test]
async fn test_signed_delivery_is_dispatched() {
    let handler = Arc::new(MockEventHandler::default());
    let app = test_app(APP_SECRET, handler.clone());
    let signature = compute_signature(MESSAGE_DELIVERY.as_bytes(), APP_SECRET).unwrap();

    let response = app
        .oneshot(delivery(MESSAGE_DELIVERY, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
    assert_eq!(handler.calls(), vec![EventKind::Message]);
}

/// Verify that a bad signature is rejected before anything is dispatched.
#[tokio::test]
async fn test_invalid_signature_is_forbidden() {
    let handler = Arc::new(MockEventHandler::default());
    let app = test_app(APP_SECRET, handler.clone());
    let signature = compute_signature(MESSAGE_DELIVERY.as_bytes(), "other-secret").unwrap();

    let response = app
        .oneshot(delivery(MESSAGE_DELIVERY, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "Invalid signature");
    assert!(handler.calls().is_empty());
}

/// Verify that a missing signature header is rejected when a secret is set.
#[tokio::test]
async fn test_missing_signature_is_forbidden_when_secret_configured() {
    let handler = Arc::new(MockEventHandler::default());
    let app = test_app(APP_SECRET, handler.clone());

    let response = app
        .oneshot(delivery(MESSAGE_DELIVERY, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(handler.calls().is_empty());
}

/// Verify that the signature gate runs before the empty-body check.
#[tokio::test]
async fn test_empty_body_with_bad_signature_is_forbidden() {
    let app = test_app(APP_SECRET, Arc::new(MockEventHandler::default()));

    let response = app
        .oneshot(delivery("", Some("sha256=00")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

/// Verify that signatures are not checked when no secret is configured.
#[tokio::test]
async fn test_unsigned_delivery_accepted_without_secret() {
    let handler = Arc::new(MockEventHandler::default());
    let app = test_app("", handler.clone());

    let response = app
        .oneshot(delivery(MESSAGE_DELIVERY, Some("sha256=garbage")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(handler.calls(), vec![EventKind::Message]);
}

// ============================================================================
// Delivery: lenient acknowledgement
// ============================================================================

/// Verify that bodies that carry nothing are acknowledged without dispatch.
#[tokio::test]
async fn test_empty_and_malformed_bodies_are_acknowledged() {
    for body in ["", "   ", "null", "{}", "{not json", "[1,2]", "\"text\""] {
        let handler = Arc::new(MockEventHandler::default());
        let app = test_app("", handler.clone());

        let response = app.oneshot(delivery(body, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK, "body: {:?}", body);
        assert_eq!(body_text(response).await, "OK");
        assert!(handler.calls().is_empty(), "body: {:?}", body);
    }
}

/// Verify that deliveries for other products are acknowledged and ignored.
#[tokio::test]
async fn test_non_instagram_object_is_ignored() {
    let handler = Arc::new(MockEventHandler::default());
    let app = test_app("", handler.clone());
    let body = MESSAGE_DELIVERY.replace("\"instagram\"", "\"page\"");

    let response = app.oneshot(delivery(&body, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(handler.calls().is_empty());
}

/// Verify that an unknown change field is ignored with a 200.
#[tokio::test]
async fn test_unknown_change_field_is_ignored() {
    let handler = Arc::new(MockEventHandler::default());
    let app = test_app("", handler.clone());
    let body = r#"{"object":"instagram","entry":[{"id":"1","time":1,"changes":[{"field":"live_comments","value":{}}]}]}"#;

    let response = app.oneshot(delivery(body, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(handler.calls().is_empty());
}

/// Verify that handler errors and panics still produce 200 and that sibling
/// changes and later entries are processed.
#[tokio::test]
async fn test_failing_handlers_do_not_change_response() {
    let handler = Arc::new(MockEventHandler {
        fail_comments: true,
        panic_on_mentions: true,
        ..MockEventHandler::default()
    });
    let app = test_app("", handler.clone());
    let body = r#"{"object":"instagram","entry":[
        {"id":"1","time":1,"changes":[
            {"field":"comments","value":{"id":"c1"}},
            {"field":"mentions","value":{"media_id":"m1"}},
            {"field":"story_insights","value":{"media_id":"s1"}}
        ]},
        {"id":"2","time":2,"messaging":[{"sender":{"id":"x"},"read":{}}]}
    ]}"#;

    let response = app.oneshot(delivery(body, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
    assert_eq!(
        handler.calls(),
        vec![
            EventKind::Comment,
            EventKind::Mention,
            EventKind::StoryInsights,
            EventKind::Read
        ]
    );
}

// ============================================================================
// Middleware
// ============================================================================

/// Verify that an incoming correlation ID is echoed on the response.
#[tokio::test]
async fn test_correlation_id_is_propagated() {
    let app = test_app("", Arc::new(MockEventHandler::default()));
    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .header(CORRELATION_ID_HEADER, "req-42")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get(CORRELATION_ID_HEADER).unwrap(),
        "req-42"
    );
}

/// Verify that a correlation ID is generated when the request has none.
#[tokio::test]
async fn test_correlation_id_is_generated() {
    let app = test_app("", Arc::new(MockEventHandler::default()));

    let response = app.oneshot(get("/health")).await.unwrap();

    let header = response
        .headers()
        .get(CORRELATION_ID_HEADER)
        .expect("correlation id header must be set")
        .to_str()
        .unwrap();
    assert!(uuid::Uuid::parse_str(header).is_ok());
}

/// Verify that bodies over the configured limit are acknowledged but not dispatched.
#[tokio::test]
async fn test_oversized_body_is_acknowledged_without_dispatch() {
    let handler = Arc::new(MockEventHandler::default());
    let mut config = test_config("");
    config.server.max_body_size = 16;
    let app = create_router(AppState::new(config, handler.clone()));

    let response = app
        .oneshot(delivery(MESSAGE_DELIVERY, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
    assert!(handler.calls().is_empty());
}

/// Verify that an oversized body still has to carry a valid signature.
#[tokio::test]
async fn test_oversized_body_with_bad_signature_is_forbidden() {
    let mut config = test_config(APP_SECRET);
    config.server.max_body_size = 16;
    let app = create_router(AppState::new(
        config,
        Arc::new(MockEventHandler::default()),
    ));

    let response = app
        .oneshot(delivery(MESSAGE_DELIVERY, Some("sha256=00")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

/// Verify that processing which outlives the timeout is still answered with 200.
#[tokio::test]
async fn test_slow_handler_times_out_with_ok() {
    let handler = Arc::new(MockEventHandler {
        stall_messages: true,
        ..MockEventHandler::default()
    });
    let mut config = test_config("");
    config.server.timeout_seconds = 1;
    let app = create_router(AppState::new(config, handler.clone()));

    let response = app
        .oneshot(delivery(MESSAGE_DELIVERY, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
    assert_eq!(handler.calls(), vec![EventKind::Message]);
}

// ============================================================================
// Request logging
// ============================================================================

/// Shared buffer the test subscriber writes formatted events into.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

/// Verify that request logs carry the path but never the handshake token.
#[tokio::test]
async fn test_handshake_logs_do_not_contain_verify_token() {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .without_time()
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let secret_token = "super-secret-verify-token";
    let mut config = test_config("");
    config.instagram.verify_token = secret_token.to_string();
    let app = create_router(AppState::new(
        config,
        Arc::new(MockEventHandler::default()),
    ));

    let response = app
        .oneshot(get(&format!(
            "/webhook?hub.mode=subscribe&hub.verify_token={}&hub.challenge=abc",
            secret_token
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let logs = buffer.contents();
    assert!(logs.contains("path=/webhook"), "logs: {}", logs);
    assert!(!logs.contains(secret_token), "logs: {}", logs);
}

/// Verify that only GET and POST are routed on /webhook.
#[tokio::test]
async fn test_put_on_webhook_is_not_allowed() {
    let app = test_app("", Arc::new(MockEventHandler::default()));
    let request = Request::builder()
        .method("PUT")
        .uri("/webhook")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

/// Verify that Debug output of the state does not leak secrets.
#[test]
fn test_app_state_debug_redacts_secrets() {
    let state = AppState::new(
        test_config(APP_SECRET),
        Arc::new(MockEventHandler::default()),
    );

    let debug_str = format!("{:?}", state);

    assert!(!debug_str.contains(APP_SECRET));
    assert!(!debug_str.contains(VERIFY_TOKEN));
}
