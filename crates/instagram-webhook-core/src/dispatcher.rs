//! Routing of decoded events to an [`EventHandler`].
//!
//! Every handler call is guarded on its own. An `Err` or a panic from one
//! messaging event or change is logged and counted, and processing continues
//! with the next item, the next list and the next entry.

use crate::error::HandlerError;
use crate::events::{Change, Entry, EventKind, MessagingEvent, WebhookEnvelope};
use crate::handlers::EventHandler;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::ops::AddAssign;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, instrument, trace};

/// Outcome counts for one dispatch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Items whose handler returned `Ok`.
    pub dispatched: usize,

    /// Items with no matching handler (unknown messaging keys or fields).
    pub ignored: usize,

    /// Items whose handler returned `Err` or panicked.
    pub failed: usize,
}

impl DispatchSummary {
    /// Total number of items seen.
    pub fn total(&self) -> usize {
        self.dispatched + self.ignored + self.failed
    }
}

impl AddAssign for DispatchSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.dispatched += rhs.dispatched;
        self.ignored += rhs.ignored;
        self.failed += rhs.failed;
    }
}

/// Walks entries and routes each item to the configured handler.
#[derive(Clone)]
pub struct EventDispatcher {
    handler: Arc<dyn EventHandler>,
}

impl EventDispatcher {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self { handler }
    }

    /// Dispatch every entry of the envelope, in order.
    ///
    /// The `object` discriminator is not checked here; callers filter
    /// non-Instagram deliveries before dispatching.
    pub async fn dispatch_envelope(&self, envelope: &WebhookEnvelope) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for entry in &envelope.entry {
            summary += self.dispatch_entry(entry).await;
        }
        summary
    }

    /// Dispatch the messaging events, then the changes, of one entry.
    #[instrument(skip(self, entry), fields(entry_id = %entry.id, entry_time = entry.time))]
    pub async fn dispatch_entry(&self, entry: &Entry) -> DispatchSummary {
        debug!("Processing entry");
        let mut summary = DispatchSummary::default();

        if let Some(events) = &entry.messaging {
            for (index, event) in events.iter().enumerate() {
                self.dispatch_messaging_event(&entry.id, index, event, &mut summary)
                    .await;
            }
        }

        if let Some(changes) = &entry.changes {
            for (index, change) in changes.iter().enumerate() {
                self.dispatch_change(&entry.id, index, change, &mut summary)
                    .await;
            }
        }

        summary
    }

    async fn dispatch_messaging_event(
        &self,
        entry_id: &str,
        index: usize,
        event: &MessagingEvent,
        summary: &mut DispatchSummary,
    ) {
        let handler = &self.handler;
        let (kind, outcome) = match event {
            MessagingEvent::Message { context, message } => (
                EventKind::Message,
                guarded(handler.handle_message(context, message)).await,
            ),
            MessagingEvent::Postback { context, postback } => (
                EventKind::Postback,
                guarded(handler.handle_postback(context, postback)).await,
            ),
            MessagingEvent::Reaction { context, reaction } => (
                EventKind::Reaction,
                guarded(handler.handle_reaction(context, reaction)).await,
            ),
            MessagingEvent::Read { context, read } => (
                EventKind::Read,
                guarded(handler.handle_read(context, read)).await,
            ),
            MessagingEvent::Unknown { context } => {
                trace!(
                    entry_id = %entry_id,
                    index,
                    sender_id = %context.sender(),
                    "Messaging event has no recognised type; ignoring"
                );
                summary.ignored += 1;
                return;
            }
        };

        record(entry_id, "messaging", index, kind, outcome, summary);
    }

    async fn dispatch_change(
        &self,
        entry_id: &str,
        index: usize,
        change: &Change,
        summary: &mut DispatchSummary,
    ) {
        let handler = &self.handler;
        let (kind, outcome) = match change {
            Change::Comments(comment) => (
                EventKind::Comment,
                guarded(handler.handle_comment(comment)).await,
            ),
            Change::Mentions(mention) => (
                EventKind::Mention,
                guarded(handler.handle_mention(mention)).await,
            ),
            Change::StoryInsights(insights) => (
                EventKind::StoryInsights,
                guarded(handler.handle_story_insights(insights)).await,
            ),
            Change::Unknown { field } => {
                trace!(entry_id = %entry_id, index, field = %field, "Unhandled change field; ignoring");
                summary.ignored += 1;
                return;
            }
        };

        record(entry_id, "changes", index, kind, outcome, summary);
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}

/// Result of one guarded handler call.
enum Outcome {
    Handled,
    Failed(HandlerError),
    Panicked(String),
}

async fn guarded<F>(call: F) -> Outcome
where
    F: Future<Output = Result<(), HandlerError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(())) => Outcome::Handled,
        Ok(Err(e)) => Outcome::Failed(e),
        Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
    }
}

fn record(
    entry_id: &str,
    list: &'static str,
    index: usize,
    kind: EventKind,
    outcome: Outcome,
    summary: &mut DispatchSummary,
) {
    match outcome {
        Outcome::Handled => {
            summary.dispatched += 1;
        }
        Outcome::Failed(e) => {
            error!(
                entry_id = %entry_id,
                list,
                index,
                kind = %kind,
                error = %e,
                "Event handler returned an error; continuing with next item"
            );
            summary.failed += 1;
        }
        Outcome::Panicked(message) => {
            error!(
                entry_id = %entry_id,
                list,
                index,
                kind = %kind,
                panic = %message,
                "Event handler panicked; continuing with next item"
            );
            summary.failed += 1;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
