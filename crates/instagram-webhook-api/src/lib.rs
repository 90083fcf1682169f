//! # Instagram Webhook HTTP Service
//!
//! HTTP surface for receiving Instagram platform webhooks.
//!
//! This service provides:
//! - the subscription handshake (`GET /webhook`)
//! - signed event delivery (`POST /webhook`)
//! - health check (`GET /health`) and service descriptor (`GET /`)
//!
//! Delivery answers `403` only for a bad signature. Every other outcome,
//! including unparseable bodies and failing handlers, is answered with
//! `200 OK` so the platform does not retry.

pub mod config;
pub mod errors;
pub mod responses;

pub use config::{
    InstagramConfig, LoggingConfig, ServerConfig, ServiceConfig, ServiceInfoConfig,
    DEFAULT_VERIFY_TOKEN,
};
pub use errors::{ConfigError, ServiceError, WebhookHandlerError};
pub use responses::{
    EndpointsDescriptor, HealthResponse, ServiceDescriptor, VerificationParams, EVENTS_SUPPORTED,
};

use axum::{
    extract::{rejection::QueryRejection, DefaultBodyLimit, Query, State},
    http::HeaderMap,
    middleware,
    response::{Json, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use instagram_webhook_core::{
    constant_time_eq, parse_payload, DispatchSummary, EventDispatcher, EventHandler, PayloadError,
    SignatureVerifier, SIGNATURE_HEADER,
};
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument, warn};

/// Handshake mode the platform sends when subscribing.
pub const SUBSCRIBE_MODE: &str = "subscribe";

/// Correlation header read from requests and echoed on responses.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Verifies delivery signatures against the app secret
    pub verifier: Arc<SignatureVerifier>,

    /// Routes decoded events to the handler set
    pub dispatcher: EventDispatcher,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServiceConfig, handler: Arc<dyn EventHandler>) -> Self {
        let verifier = SignatureVerifier::new(config.instagram.app_secret.clone());
        Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            dispatcher: EventDispatcher::new(handler),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
///
/// The body-size cap and processing timeout are enforced by the delivery
/// handler, which answers only `200` or `403`.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_service_descriptor))
        .route("/health", get(handle_health_check))
        .route(
            "/webhook",
            get(handle_webhook_verification).post(handle_webhook_delivery),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(middleware::from_fn(request_logging_middleware))
                .layer(DefaultBodyLimit::disable())
                .into_inner(),
        )
        .with_state(state)
}

/// Span for one request, carrying the path but never the query string.
fn request_span(request: &axum::extract::Request) -> tracing::Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// Start HTTP server
///
/// Runs until SIGINT or SIGTERM, then stops accepting connections and waits
/// up to `server.shutdown_timeout_seconds` for in-flight requests.
pub async fn start_server(
    config: ServiceConfig,
    handler: Arc<dyn EventHandler>,
) -> Result<(), ServiceError> {
    config.validate()?;

    let host = config.server.host.clone();
    let port = config.server.port;
    let address = format!("{}:{}", host, port);
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let app = create_router(AppState::new(config, handler));

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", address);

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown = async move {
        shutdown_signal(shutdown_timeout).await;
        let _ = signalled_tx.send(());
    };

    let serve = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    };

    let drain_deadline = async move {
        if signalled_rx.await.is_ok() {
            tokio::time::sleep(shutdown_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = serve => {
            result.map_err(|e| ServiceError::ServerFailed {
                message: e.to_string(),
            })?;
        }
        _ = drain_deadline => {
            warn!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "In-flight requests did not finish before the shutdown timeout; stopping anyway"
            );
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal(shutdown_timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
        },
    }
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Subscription handshake.
///
/// Echoes `hub.challenge` verbatim when `hub.mode` is `subscribe` and
/// `hub.verify_token` equals the configured token. Any other combination,
/// including missing or unparseable parameters, is a `403`.
#[instrument(skip(state, params))]
pub async fn handle_webhook_verification(
    State(state): State<AppState>,
    params: Result<Query<VerificationParams>, QueryRejection>,
) -> Result<String, WebhookHandlerError> {
    let params = match params {
        Ok(Query(params)) => params,
        Err(e) => {
            debug!(error = %e, "Handshake query string could not be parsed");
            VerificationParams::default()
        }
    };

    let token_valid = params.verify_token.as_deref().is_some_and(|token| {
        constant_time_eq(
            token.as_bytes(),
            state.config.instagram.verify_token.as_bytes(),
        )
    });
    let mode = params.mode.as_deref().unwrap_or_default();

    info!(mode = %mode, token_valid, "Handshake received");

    if mode == SUBSCRIBE_MODE && token_valid {
        info!("Webhook subscription verified");
        Ok(params.challenge.unwrap_or_default())
    } else {
        Err(WebhookHandlerError::VerificationFailed)
    }
}

/// Event delivery.
///
/// The signature is checked over the raw body before anything is parsed.
/// After that gate, the response is always `200 OK`: bodies over
/// `server.max_body_size` are dropped unprocessed, and processing that
/// outlives `server.timeout_seconds` is abandoned.
#[instrument(skip(state, headers, body), fields(body_len = body.len()))]
pub async fn handle_webhook_delivery(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, WebhookHandlerError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !state.verifier.verify(&body, signature) {
        return Err(WebhookHandlerError::InvalidSignature);
    }

    let max_body_size = state.config.server.max_body_size;
    if body.len() > max_body_size {
        warn!(
            body_len = body.len(),
            max_body_size,
            "Delivery exceeds the configured body size; not processing"
        );
        return Ok("OK");
    }

    let timeout = Duration::from_secs(state.config.server.timeout_seconds);
    match tokio::time::timeout(timeout, process_delivery(&state.dispatcher, &body)).await {
        Ok(summary) => {
            debug!(
                dispatched = summary.dispatched,
                ignored = summary.ignored,
                failed = summary.failed,
                "Delivery processed"
            );
        }
        Err(_) => {
            error!(
                timeout_seconds = timeout.as_secs(),
                "Delivery processing timed out; remaining events were not handled"
            );
        }
    }

    Ok("OK")
}

/// Decode the body and dispatch each entry. Never fails; problems are logged.
async fn process_delivery(dispatcher: &EventDispatcher, body: &[u8]) -> DispatchSummary {
    let envelope = match parse_payload(body) {
        Ok(envelope) => envelope,
        Err(PayloadError::Empty) => {
            warn!("Empty payload received");
            return DispatchSummary::default();
        }
        Err(e) => {
            warn!(error = %e, "Could not parse delivery payload");
            return DispatchSummary::default();
        }
    };

    info!(
        object = envelope.object.as_deref().unwrap_or("unknown"),
        entries = envelope.entry.len(),
        "Webhook received"
    );

    if !envelope.is_instagram() {
        debug!("Delivery is not for the instagram object; ignoring");
        return DispatchSummary::default();
    }

    let mut summary = DispatchSummary::default();
    for entry in &envelope.entry {
        summary += dispatcher.dispatch_entry(entry).await;
    }

    if summary.failed > 0 {
        error!(
            failed = summary.failed,
            dispatched = summary.dispatched,
            "Some events could not be handled"
        );
    }

    summary
}

// ============================================================================
// Informational Handlers
// ============================================================================

/// Service descriptor
async fn handle_service_descriptor(State(state): State<AppState>) -> Json<ServiceDescriptor> {
    let info = &state.config.service;
    Json(ServiceDescriptor {
        service: info.display_name.clone(),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: EndpointsDescriptor::default(),
        events_supported: EVENTS_SUPPORTED.iter().map(|e| e.to_string()).collect(),
        environment: info.environment.clone(),
        url: info.public_url.clone(),
    })
}

/// Basic health check endpoint
async fn handle_health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service.name.clone(),
        timestamp: chrono::Utc::now(),
    })
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking
///
/// Reuses an incoming `x-correlation-id` or generates one, records it on the
/// span, and echoes it on the response.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri().path(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    // Path only; the handshake query carries the verify token.
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());

    request.extensions_mut().insert(correlation_id.clone());

    debug!(
        correlation_id = %correlation_id,
        method = %method,
        path = %path,
        "Request started"
    );

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
