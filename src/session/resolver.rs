use std::sync::Arc;

use thiserror::Error;

use crate::gateway::{ConversationGateway, GatewayError};
use crate::store::{SessionRecord, SessionStore, StoreError};

use super::KeyedLocks;

/// Why a session could not be resolved to a thread.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The store could not be read or written. A store failure is never
    /// treated as "no session yet".
    #[error("session store: {0}")]
    Store(#[from] StoreError),

    /// The gateway refused to create a thread.
    #[error("conversation gateway: {0}")]
    Gateway(#[from] GatewayError),
}

/// Maps session ids to gateway threads, creating threads lazily.
#[derive(Debug, Clone)]
pub struct ThreadResolver {
    store: Arc<dyn SessionStore>,
    gateway: Arc<dyn ConversationGateway>,
    locks: KeyedLocks,
}

impl ThreadResolver {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, gateway: Arc<dyn ConversationGateway>) -> Self {
        Self {
            store,
            gateway,
            locks: KeyedLocks::new(),
        }
    }

    /// Return the session's record, creating its thread if it has none.
    ///
    /// Once a session is mapped, every later call returns the same thread
    /// without touching the gateway.
    pub async fn resolve(&self, session_id: &str) -> Result<SessionRecord, ResolveError> {
        if let Some(record) = self.store.find_session(session_id).await? {
            return Ok(record);
        }

        let _guard = self.locks.lock(session_id).await;

        // Another turn for this session may have created the thread while we waited.
        if let Some(record) = self.store.find_session(session_id).await? {
            return Ok(record);
        }

        let thread_id = self.gateway.create_thread().await?;
        let record = self
            .store
            .insert_session_if_absent(session_id, &thread_id)
            .await?;

        if record.thread_id == thread_id {
            tracing::info!(
                name: "session.thread.created",
                session_id = %session_id,
                thread_id = %thread_id,
                "Created conversation thread for session"
            );
        } else {
            tracing::warn!(
                session_id = %session_id,
                kept_thread_id = %record.thread_id,
                orphaned_thread_id = %thread_id,
                "Session was mapped concurrently; discarding new thread"
            );
        }

        Ok(record)
    }
}
