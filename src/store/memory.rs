//! Process-local session store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{ChatLogEntry, SessionRecord, SessionStore, StoreError, StoreResult};

/// In-memory tables mirroring the Postgres schema.
///
/// Suitable for local development (`persistence.provider = "memory"`) and
/// tests. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    properties: RwLock<HashMap<String, String>>,
    chat_logs: RwLock<Vec<ChatLogEntry>>,
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

impl MemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given `slug → assistant id` rows.
    #[must_use]
    pub fn with_properties(properties: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            properties: RwLock::new(properties.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Add or replace a property row.
    pub fn insert_property(&self, slug: impl Into<String>, assistant_id: impl Into<String>) {
        self.properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slug.into(), assistant_id.into());
    }

    /// Snapshot of one session row.
    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    /// Number of session rows.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Snapshot of the chat log, oldest first.
    #[must_use]
    pub fn chat_logs(&self) -> Vec<ChatLogEntry> {
        self.chat_logs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_session(&self, session_id: &str) -> StoreResult<Option<SessionRecord>> {
        let guard = self.sessions.read().map_err(poisoned)?;
        Ok(guard.get(session_id).cloned())
    }

    async fn insert_session_if_absent(
        &self,
        session_id: &str,
        thread_id: &str,
    ) -> StoreResult<SessionRecord> {
        let mut guard = self.sessions.write().map_err(poisoned)?;
        let record = guard
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord {
                session_id: session_id.to_string(),
                thread_id: thread_id.to_string(),
                contact_requested: false,
            });
        Ok(record.clone())
    }

    async fn mark_contact_requested(&self, session_id: &str) -> StoreResult<()> {
        let mut guard = self.sessions.write().map_err(poisoned)?;
        if let Some(record) = guard.get_mut(session_id) {
            record.contact_requested = true;
        }
        Ok(())
    }

    async fn find_assistant_id(&self, property_slug: &str) -> StoreResult<Option<String>> {
        let guard = self.properties.read().map_err(poisoned)?;
        Ok(guard.get(property_slug).cloned())
    }

    async fn append_chat_log(&self, entry: &ChatLogEntry) -> StoreResult<()> {
        self.chat_logs.write().map_err(poisoned)?.push(entry.clone());
        Ok(())
    }
}
