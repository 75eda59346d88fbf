use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::{ChatLogEntry, SessionRecord, SessionStore, StoreResult};

/// Postgres-backed session store.
#[derive(Debug, Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    /// Open a pool and bring the schema up to date.
    pub async fn connect(connection_string: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await?;

        // Run Migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!(
            name: "store.connected",
            max_connections,
            "Postgres session store ready"
        );

        Ok(Self { pool })
    }
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<SessionRecord> {
    Ok(SessionRecord {
        session_id: row.try_get("session_id")?,
        thread_id: row.try_get("thread_id")?,
        contact_requested: row.try_get("contact_requested")?,
    })
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn find_session(&self, session_id: &str) -> StoreResult<Option<SessionRecord>> {
        let row = sqlx::query(
            "SELECT session_id, thread_id, contact_requested FROM user_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn insert_session_if_absent(
        &self,
        session_id: &str,
        thread_id: &str,
    ) -> StoreResult<SessionRecord> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO user_sessions (session_id, thread_id)
            VALUES ($1, $2)
            ON CONFLICT (session_id) DO NOTHING
            RETURNING session_id, thread_id, contact_requested
            "#,
        )
        .bind(session_id)
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return record_from_row(&row);
        }

        // Lost to a concurrent writer. Its row is only visible to a new
        // statement snapshot.
        let row = sqlx::query(
            "SELECT session_id, thread_id, contact_requested FROM user_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        record_from_row(&row)
    }

    async fn mark_contact_requested(&self, session_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE user_sessions SET contact_requested = TRUE WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_assistant_id(&self, property_slug: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT assistant_id FROM properties WHERE slug = $1")
            .bind(property_slug)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|row| row.try_get::<String, _>("assistant_id"))
            .transpose()?)
    }

    async fn append_chat_log(&self, entry: &ChatLogEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_logs (session_id, property_slug, user_message, assistant_response, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&entry.session_id)
        .bind(&entry.property_slug)
        .bind(&entry.user_message)
        .bind(&entry.assistant_response)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
