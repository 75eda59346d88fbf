//! One chat turn, end to end.
//!
//! [`ChatService::handle`] validates the request, picks the property's
//! assistant, resolves the session's thread, submits the message, waits for
//! the run, reads the reply and records the exchange.

mod contact;

pub use contact::ContactPolicy;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::gateway::{ConversationGateway, GatewayError, PollPolicy, wait_for_run};
use crate::session::{ResolveError, ThreadResolver};
use crate::store::{ChatLogEntry, SessionStore, StoreError};

/// Inbound turn as received from the client. Every field may be absent.
#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
    pub message: Option<String>,
    pub session_id: Option<String>,
    pub property_slug: Option<String>,
}

/// Outcome of a successful turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub reply: String,
    /// The session the turn ran in; generated when the client sent none.
    pub session_id: String,
}

/// Why a turn failed.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("missing message or property slug")]
    MissingFields,

    #[error("no assistant configured for property {0}")]
    AssistantNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Orchestrates chat turns against a store and a gateway.
#[derive(Debug, Clone)]
pub struct ChatService {
    store: Arc<dyn SessionStore>,
    gateway: Arc<dyn ConversationGateway>,
    resolver: ThreadResolver,
    poll: PollPolicy,
    contact: ContactPolicy,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ChatService {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        gateway: Arc<dyn ConversationGateway>,
        poll: PollPolicy,
        contact: ContactPolicy,
    ) -> Self {
        let resolver = ThreadResolver::new(Arc::clone(&store), Arc::clone(&gateway));
        Self {
            store,
            gateway,
            resolver,
            poll,
            contact,
        }
    }

    /// Run one turn and return the assistant's reply.
    #[instrument(
        skip(self, turn),
        fields(
            session_id = tracing::field::Empty,
            property_slug = tracing::field::Empty,
        )
    )]
    pub async fn handle(&self, turn: ChatTurn) -> Result<ChatReply, ChatError> {
        let (Some(message), Some(property_slug)) =
            (present(turn.message), present(turn.property_slug))
        else {
            return Err(ChatError::MissingFields);
        };
        let session_id =
            present(turn.session_id).unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = tracing::Span::current();
        span.record("session_id", session_id.as_str());
        span.record("property_slug", property_slug.as_str());
        tracing::info!("Handling chat turn");
        tracing::debug!(user_message = %message, "User message");

        let assistant_id = self
            .store
            .find_assistant_id(&property_slug)
            .await?
            .ok_or_else(|| ChatError::AssistantNotFound(property_slug.clone()))?;

        let session = self.resolver.resolve(&session_id).await?;
        let thread_id = session.thread_id.as_str();

        let instructions = (self.contact.enabled() && !session.contact_requested)
            .then(|| self.contact.instruction());

        self.gateway.add_user_message(thread_id, &message).await?;
        let run = self
            .gateway
            .create_run(thread_id, &assistant_id, instructions)
            .await?;
        let run = wait_for_run(self.gateway.as_ref(), thread_id, run, self.poll).await?;

        let reply = self
            .gateway
            .latest_message_text(thread_id)
            .await?
            .ok_or_else(|| GatewayError::EmptyReply(thread_id.to_string()))?;

        tracing::info!(
            thread_id = %thread_id,
            run_id = %run.id,
            reply_length = reply.len(),
            "Assistant replied"
        );
        tracing::debug!(reply = %reply, "Assistant reply");

        if !session.contact_requested && self.contact.solicits_contact(&reply) {
            match self.store.mark_contact_requested(&session_id).await {
                Ok(()) => tracing::info!("Session flagged as asked for contact details"),
                Err(e) => tracing::warn!(error = %e, "Failed to flag contact request"),
            }
        }

        let entry = ChatLogEntry {
            session_id: session_id.clone(),
            property_slug,
            user_message: message,
            assistant_response: reply.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.append_chat_log(&entry).await {
            tracing::warn!(error = %e, "Failed to write chat log");
        }

        Ok(ChatReply { reply, session_id })
    }
}
