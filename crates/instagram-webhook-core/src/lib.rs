//! # Instagram Webhook Core
//!
//! Domain logic for receiving Instagram platform webhooks: signature
//! verification, lenient decoding of delivery payloads into typed events, and
//! dispatch of those events to an [`EventHandler`].
//!
//! The HTTP surface lives in `instagram-webhook-api`; this crate has no
//! knowledge of HTTP and can be exercised directly.
//!
//! ## Usage
//!
//! ```rust
//! use instagram_webhook_core::{
//!     parse_payload, EventDispatcher, LoggingEventHandler, SignatureVerifier,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let body = br#"{"object":"instagram","entry":[{"id":"1","time":100}]}"#;
//!
//! let verifier = SignatureVerifier::new("");
//! assert!(verifier.verify(body, ""));
//!
//! let envelope = parse_payload(body).expect("valid payload");
//! let dispatcher = EventDispatcher::new(Arc::new(LoggingEventHandler));
//! let summary = dispatcher.dispatch_envelope(&envelope).await;
//! assert_eq!(summary.failed, 0);
//! # }
//! ```

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handlers;
pub mod signature;

pub use dispatcher::{DispatchSummary, EventDispatcher};
pub use error::{HandlerError, PayloadError, SignatureError};
pub use events::{
    parse_payload, Attachment, Change, CommentAuthor, CommentMedia, CommentValue, Entry,
    EventContext, EventKind, MentionValue, MessagePayload, MessagingEvent, PostbackPayload,
    ReactionPayload, ReadPayload, StoryInsightsValue, WebhookEnvelope,
};
pub use handlers::{EventHandler, LoggingEventHandler};
pub use signature::{compute_signature, constant_time_eq, SignatureVerifier};

/// Value of the envelope `object` field for Instagram deliveries.
pub const INSTAGRAM_OBJECT: &str = "instagram";

/// Header carrying the HMAC-SHA256 signature of a delivery.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
