//! Typed model of Instagram webhook deliveries.
//!
//! A delivery is a [`WebhookEnvelope`] holding [`Entry`] items. Each entry may
//! carry direct-message activity (`messaging`) and/or field changes
//! (`changes`). Both are modelled as sum types so the dispatcher can route
//! with an exhaustive `match`.
//!
//! Decoding is deliberately lenient. Each entry, messaging event and change
//! is decoded on its own from a `serde_json::Value`; missing fields take
//! defaults, a field of the wrong type takes its default without touching
//! its siblings, and an item that is not an object degrades to defaults
//! instead of failing the whole delivery.

use crate::error::PayloadError;
use crate::INSTAGRAM_OBJECT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use tracing::debug;

// ============================================================================
// Event kinds
// ============================================================================

/// The event subtypes a handler can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Postback,
    Reaction,
    Read,
    Comment,
    Mention,
    StoryInsights,
}

impl EventKind {
    /// Stable name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Postback => "postback",
            Self::Reaction => "reaction",
            Self::Read => "read",
            Self::Comment => "comment",
            Self::Mention => "mention",
            Self::StoryInsights => "story_insights",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Decode a raw delivery body.
///
/// # Errors
///
/// * [`PayloadError::Empty`] for an empty/whitespace body, `null` or `{}`
/// * [`PayloadError::Malformed`] when the body is not JSON
/// * [`PayloadError::NotAnObject`] when the top-level value is not an object
pub fn parse_payload(body: &[u8]) -> Result<WebhookEnvelope, PayloadError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(PayloadError::Empty);
    }

    let value: Value = serde_json::from_slice(body)?;
    WebhookEnvelope::from_value(&value)
}

/// Top-level delivery payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookEnvelope {
    /// Discriminator; `"instagram"` for the deliveries this service handles.
    pub object: Option<String>,

    /// Delivery units, in the order received.
    pub entry: Vec<Entry>,
}

impl WebhookEnvelope {
    /// Build an envelope from an already-parsed JSON value.
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let map = match value {
            Value::Null => return Err(PayloadError::Empty),
            Value::Object(map) if map.is_empty() => return Err(PayloadError::Empty),
            Value::Object(map) => map,
            other => {
                return Err(PayloadError::NotAnObject {
                    found: json_type_name(other),
                })
            }
        };

        let object = map
            .get("object")
            .and_then(Value::as_str)
            .map(str::to_owned);

        let entry = map
            .get("entry")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().map(Entry::from_value).collect())
            .unwrap_or_default();

        Ok(Self { object, entry })
    }

    /// Whether this delivery is addressed to the Instagram product.
    pub fn is_instagram(&self) -> bool {
        self.object.as_deref() == Some(INSTAGRAM_OBJECT)
    }
}

/// One delivery unit, scoped to a single subscribed account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    pub id: String,
    pub time: i64,

    /// Present only when the platform sent a `messaging` array.
    pub messaging: Option<Vec<MessagingEvent>>,

    /// Present only when the platform sent a `changes` array.
    pub changes: Option<Vec<Change>>,
}

impl Entry {
    pub fn from_value(value: &Value) -> Self {
        Self {
            id: string_value(value.get("id")).unwrap_or_default(),
            time: value.get("time").and_then(Value::as_i64).unwrap_or_default(),
            messaging: value
                .get("messaging")
                .and_then(Value::as_array)
                .map(|events| events.iter().map(MessagingEvent::from_value).collect()),
            changes: value
                .get("changes")
                .and_then(Value::as_array)
                .map(|changes| changes.iter().map(Change::from_value).collect()),
        }
    }
}

// ============================================================================
// Messaging events
// ============================================================================

/// Fields shared by every messaging event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventContext {
    pub sender_id: Option<String>,
    pub recipient_id: Option<String>,
    pub timestamp: Option<i64>,
}

impl EventContext {
    fn from_value(value: &Value) -> Self {
        Self {
            sender_id: string_value(value.pointer("/sender/id")),
            recipient_id: string_value(value.pointer("/recipient/id")),
            timestamp: value.get("timestamp").and_then(Value::as_i64),
        }
    }

    /// Sender id, or an empty string when absent.
    pub fn sender(&self) -> &str {
        self.sender_id.as_deref().unwrap_or_default()
    }

    /// Recipient id, or an empty string when absent.
    pub fn recipient(&self) -> &str {
        self.recipient_id.as_deref().unwrap_or_default()
    }
}

/// A direct-message activity item.
///
/// The variant is chosen by key presence in the fixed priority order
/// `message`, `postback`, `reaction`, `read`. The first key found wins even
/// if several are present.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagingEvent {
    Message {
        context: EventContext,
        message: MessagePayload,
    },
    Postback {
        context: EventContext,
        postback: PostbackPayload,
    },
    Reaction {
        context: EventContext,
        reaction: ReactionPayload,
    },
    Read {
        context: EventContext,
        read: ReadPayload,
    },
    /// None of the recognised keys were present.
    Unknown { context: EventContext },
}

impl MessagingEvent {
    pub fn from_value(value: &Value) -> Self {
        let context = EventContext::from_value(value);

        if let Some(message) = value.get("message") {
            Self::Message {
                context,
                message: decode_lenient(message, EventKind::Message),
            }
        } else if let Some(postback) = value.get("postback") {
            Self::Postback {
                context,
                postback: decode_lenient(postback, EventKind::Postback),
            }
        } else if let Some(reaction) = value.get("reaction") {
            Self::Reaction {
                context,
                reaction: decode_lenient(reaction, EventKind::Reaction),
            }
        } else if let Some(read) = value.get("read") {
            Self::Read {
                context,
                read: decode_lenient(read, EventKind::Read),
            }
        } else {
            Self::Unknown { context }
        }
    }

    pub fn context(&self) -> &EventContext {
        match self {
            Self::Message { context, .. }
            | Self::Postback { context, .. }
            | Self::Reaction { context, .. }
            | Self::Read { context, .. }
            | Self::Unknown { context } => context,
        }
    }

    /// `None` for [`MessagingEvent::Unknown`].
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Self::Message { .. } => Some(EventKind::Message),
            Self::Postback { .. } => Some(EventKind::Postback),
            Self::Reaction { .. } => Some(EventKind::Reaction),
            Self::Read { .. } => Some(EventKind::Read),
            Self::Unknown { .. } => None,
        }
    }
}

/// Direct message content.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MessagePayload {
    #[serde(deserialize_with = "lenient_string")]
    pub mid: Option<String>,
    #[serde(deserialize_with = "or_default")]
    pub text: String,
    #[serde(deserialize_with = "lenient_vec")]
    pub attachments: Vec<Attachment>,
    #[serde(deserialize_with = "or_default")]
    pub is_echo: bool,
}

/// Media attached to a direct message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Attachment {
    #[serde(rename = "type", deserialize_with = "or_default")]
    pub kind: String,
    #[serde(deserialize_with = "or_default")]
    pub payload: Option<AttachmentPayload>,
}

impl Attachment {
    pub fn url(&self) -> Option<&str> {
        self.payload.as_ref().and_then(|p| p.url.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AttachmentPayload {
    #[serde(deserialize_with = "or_default")]
    pub url: Option<String>,
}

/// Button click.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PostbackPayload {
    #[serde(deserialize_with = "lenient_string")]
    pub mid: Option<String>,
    #[serde(deserialize_with = "or_default")]
    pub title: Option<String>,
    #[serde(deserialize_with = "or_default")]
    pub payload: Option<String>,
}

/// Reaction added to or removed from a message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReactionPayload {
    #[serde(deserialize_with = "lenient_string")]
    pub mid: Option<String>,
    /// `react` or `unreact`.
    #[serde(deserialize_with = "or_default")]
    pub action: Option<String>,
    #[serde(deserialize_with = "or_default")]
    pub reaction: Option<String>,
    #[serde(deserialize_with = "or_default")]
    pub emoji: String,
}

/// Read receipt.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReadPayload {
    #[serde(deserialize_with = "lenient_string")]
    pub mid: Option<String>,
}

// ============================================================================
// Changes
// ============================================================================

/// A field change notification, keyed by the subscribed `field`.
///
/// Fields other than `comments`, `mentions` and `story_insights` decode to
/// [`Change::Unknown`] and are ignored by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Comments(CommentValue),
    Mentions(MentionValue),
    StoryInsights(StoryInsightsValue),
    Unknown { field: String },
}

impl Change {
    pub const COMMENTS: &'static str = "comments";
    pub const MENTIONS: &'static str = "mentions";
    pub const STORY_INSIGHTS: &'static str = "story_insights";

    pub fn from_value(value: &Value) -> Self {
        let field = value
            .get("field")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let payload = value.get("value").unwrap_or(&Value::Null);

        match field {
            Self::COMMENTS => Self::Comments(decode_lenient(payload, EventKind::Comment)),
            Self::MENTIONS => Self::Mentions(decode_lenient(payload, EventKind::Mention)),
            Self::STORY_INSIGHTS => {
                Self::StoryInsights(decode_lenient(payload, EventKind::StoryInsights))
            }
            other => Self::Unknown {
                field: other.to_owned(),
            },
        }
    }

    /// The `field` value this change was keyed by.
    pub fn field(&self) -> &str {
        match self {
            Self::Comments(_) => Self::COMMENTS,
            Self::Mentions(_) => Self::MENTIONS,
            Self::StoryInsights(_) => Self::STORY_INSIGHTS,
            Self::Unknown { field } => field,
        }
    }

    /// `None` for [`Change::Unknown`].
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Self::Comments(_) => Some(EventKind::Comment),
            Self::Mentions(_) => Some(EventKind::Mention),
            Self::StoryInsights(_) => Some(EventKind::StoryInsights),
            Self::Unknown { .. } => None,
        }
    }
}

/// Comment left on one of the account's media.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommentValue {
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "or_default")]
    pub text: Option<String>,
    #[serde(deserialize_with = "or_default")]
    pub from: Option<CommentAuthor>,
    #[serde(deserialize_with = "or_default")]
    pub media: Option<CommentMedia>,
    #[serde(deserialize_with = "lenient_string")]
    pub parent_id: Option<String>,
}

impl CommentValue {
    /// Author's username, `"unknown"` when the platform omitted it.
    pub fn username(&self) -> &str {
        self.from
            .as_ref()
            .and_then(|from| from.username.as_deref())
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommentAuthor {
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "or_default")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommentMedia {
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "or_default")]
    pub media_product_type: Option<String>,
}

/// The account was @-mentioned in a comment or caption.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MentionValue {
    #[serde(deserialize_with = "lenient_string")]
    pub media_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub comment_id: Option<String>,
}

/// Metrics for an expired story.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoryInsightsValue {
    #[serde(deserialize_with = "lenient_string")]
    pub media_id: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub impressions: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub reach: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub replies: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub exits: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub taps_forward: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub taps_back: Option<i64>,
}

// ============================================================================
// Lenient decoding helpers
// ============================================================================

fn decode_lenient<T>(value: &Value, kind: EventKind) -> T
where
    T: DeserializeOwned + Default,
{
    if value.is_null() {
        return T::default();
    }

    T::deserialize(value).unwrap_or_else(|e| {
        debug!(kind = %kind, error = %e, "Could not decode event payload; using defaults");
        T::default()
    })
}

/// Platform ids are strings but are occasionally sent as numbers.
fn string_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(string_value(Some(&value)))
}

/// A value of the wrong type falls back to the field's default without
/// affecting its siblings.
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Keeps the elements that decode and drops the rest.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| T::deserialize(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
