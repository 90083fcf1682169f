//! Per-event-type handlers.
//!
//! [`EventHandler`] is the seam where business logic plugs in. The bundled
//! [`LoggingEventHandler`] only records each event as a structured log line.

use crate::error::HandlerError;
use crate::events::{
    CommentValue, EventContext, MentionValue, MessagePayload, PostbackPayload, ReactionPayload,
    ReadPayload, StoryInsightsValue,
};
use async_trait::async_trait;
use tracing::info;

/// Receives decoded events from the [`EventDispatcher`].
///
/// Implementations must tolerate missing fields; every payload arrives with
/// defaults already applied. Returning `Err` only affects the item at hand.
///
/// [`EventDispatcher`]: crate::dispatcher::EventDispatcher
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Direct message received.
    async fn handle_message(
        &self,
        context: &EventContext,
        message: &MessagePayload,
    ) -> Result<(), HandlerError>;

    /// Button clicked.
    async fn handle_postback(
        &self,
        context: &EventContext,
        postback: &PostbackPayload,
    ) -> Result<(), HandlerError>;

    /// Reaction added to or removed from a message.
    async fn handle_reaction(
        &self,
        context: &EventContext,
        reaction: &ReactionPayload,
    ) -> Result<(), HandlerError>;

    /// Message marked as read.
    async fn handle_read(
        &self,
        context: &EventContext,
        read: &ReadPayload,
    ) -> Result<(), HandlerError>;

    /// Comment on the account's media.
    async fn handle_comment(&self, comment: &CommentValue) -> Result<(), HandlerError>;

    /// Account @-mentioned.
    async fn handle_mention(&self, mention: &MentionValue) -> Result<(), HandlerError>;

    /// Story metrics published after a story expires.
    async fn handle_story_insights(
        &self,
        insights: &StoryInsightsValue,
    ) -> Result<(), HandlerError>;
}

/// Handler that emits exactly one `INFO` line per event and never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_message(
        &self,
        context: &EventContext,
        message: &MessagePayload,
    ) -> Result<(), HandlerError> {
        info!(
            sender_id = %context.sender(),
            recipient_id = %context.recipient(),
            timestamp = context.timestamp.unwrap_or_default(),
            mid = message.mid.as_deref().unwrap_or_default(),
            attachments = message.attachments.len(),
            is_echo = message.is_echo,
            "Message from {}: {}",
            context.sender(),
            message.text
        );
        Ok(())
    }

    async fn handle_postback(
        &self,
        context: &EventContext,
        postback: &PostbackPayload,
    ) -> Result<(), HandlerError> {
        info!(
            sender_id = %context.sender(),
            title = postback.title.as_deref().unwrap_or_default(),
            "Postback from {}: {}",
            context.sender(),
            postback.payload.as_deref().unwrap_or_default()
        );
        Ok(())
    }

    async fn handle_reaction(
        &self,
        context: &EventContext,
        reaction: &ReactionPayload,
    ) -> Result<(), HandlerError> {
        info!(
            sender_id = %context.sender(),
            action = reaction.action.as_deref().unwrap_or_default(),
            reaction = reaction.reaction.as_deref().unwrap_or_default(),
            mid = reaction.mid.as_deref().unwrap_or_default(),
            "Reaction from {}: {}",
            context.sender(),
            reaction.emoji
        );
        Ok(())
    }

    async fn handle_read(
        &self,
        context: &EventContext,
        read: &ReadPayload,
    ) -> Result<(), HandlerError> {
        info!(
            sender_id = %context.sender(),
            mid = read.mid.as_deref().unwrap_or_default(),
            "Message read by {}",
            context.sender()
        );
        Ok(())
    }

    async fn handle_comment(&self, comment: &CommentValue) -> Result<(), HandlerError> {
        info!(
            comment_id = comment.id.as_deref().unwrap_or_default(),
            username = %comment.username(),
            media_id = comment
                .media
                .as_ref()
                .and_then(|m| m.id.as_deref())
                .unwrap_or_default(),
            "Comment from @{}: {}",
            comment.username(),
            comment.text.as_deref().unwrap_or_default()
        );
        Ok(())
    }

    async fn handle_mention(&self, mention: &MentionValue) -> Result<(), HandlerError> {
        info!(
            media_id = mention.media_id.as_deref().unwrap_or_default(),
            comment_id = mention.comment_id.as_deref().unwrap_or_default(),
            "Mention received"
        );
        Ok(())
    }

    async fn handle_story_insights(
        &self,
        insights: &StoryInsightsValue,
    ) -> Result<(), HandlerError> {
        info!(
            media_id = insights.media_id.as_deref().unwrap_or_default(),
            impressions = insights.impressions,
            reach = insights.reach,
            replies = insights.replies,
            exits = insights.exits,
            "Story insights received"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
