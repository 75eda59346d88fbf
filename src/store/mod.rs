//! Session store: the relational backend holding session, property and
//! chat log tables.
//!
//! The proxy never owns this schema's data beyond the rows it writes; the
//! [`SessionStore`] trait is the seam between request handling and the
//! hosted database.
//!
//! # Implementations
//!
//! - [`PostgresSessionStore`]: `sqlx` connection pool against Postgres
//!   (the database behind a hosted backend such as Supabase).
//! - [`MemorySessionStore`]: process-local tables for development and tests.

mod memory;
mod postgres;

pub use memory::MemorySessionStore;
pub use postgres::PostgresSessionStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PersistenceConfig;

/// Errors raised by a [`SessionStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// Query or connection failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure at startup.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Store could not be built from configuration.
    #[error("store configuration error: {0}")]
    Config(String),

    /// Store refused or failed the operation for another reason.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A session row: the session→thread mapping and its contact flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub thread_id: String,
    /// Set once the assistant has asked this session for contact details.
    pub contact_requested: bool,
}

/// One logged chat turn. Never updated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub session_id: String,
    pub property_slug: String,
    pub user_message: String,
    pub assistant_response: String,
    pub created_at: DateTime<Utc>,
}

/// Access to the hosted relational backend.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Look up a session. `Ok(None)` means the row does not exist; any
    /// failure to reach the store is an `Err`.
    async fn find_session(&self, session_id: &str) -> StoreResult<Option<SessionRecord>>;

    /// Record `session_id → thread_id` unless a mapping already exists.
    ///
    /// Returns the mapping that is stored after the call, which is the
    /// pre-existing one if another writer got there first.
    async fn insert_session_if_absent(
        &self,
        session_id: &str,
        thread_id: &str,
    ) -> StoreResult<SessionRecord>;

    /// Flip the session's contact flag to set.
    async fn mark_contact_requested(&self, session_id: &str) -> StoreResult<()>;

    /// Resolve the assistant configured for a property slug.
    async fn find_assistant_id(&self, property_slug: &str) -> StoreResult<Option<String>>;

    /// Append a chat log row.
    async fn append_chat_log(&self, entry: &ChatLogEntry) -> StoreResult<()>;
}

/// Build the store selected by `persistence.provider`.
pub async fn connect(
    config: &PersistenceConfig,
    properties: impl IntoIterator<Item = (String, String)>,
) -> StoreResult<Arc<dyn SessionStore>> {
    match config.provider.as_str() {
        "memory" => Ok(Arc::new(MemorySessionStore::with_properties(properties))),
        "postgres" => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                StoreError::Config("persistence.database_url is required for postgres".into())
            })?;
            let store = PostgresSessionStore::connect(url, config.max_connections).await?;
            Ok(Arc::new(store))
        }
        other => Err(StoreError::Config(format!(
            "unknown persistence provider: {other}"
        ))),
    }
}
