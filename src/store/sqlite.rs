//! SQLite-backed session store and message log.
//!
//! A single `SqlitePool` is shared by every request handler. Connections are
//! checked out per query and returned to the pool on drop, so no call path
//! can leak one. The counter increment is a single `UPDATE ... RETURNING`
//! statement, which SQLite executes atomically.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

use super::{Message, MessageLog, Role, Session, SessionStore, StoreError};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `database_url` and make sure
    /// the schema exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let in_memory = is_memory_url(database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Connection(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let options = if in_memory {
            options
        } else {
            options.journal_mode(SqliteJournalMode::Wal)
        };

        // Every connection to `sqlite::memory:` is its own database, so the
        // pool must hold exactly one connection and never recycle it.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(format!("failed to open {database_url}: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("Chat store ready at {}", database_url);

        Ok(store)
    }

    /// Fresh private in-memory database.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:", 1).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                email TEXT,
                profile TEXT,
                questions_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Migration(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(session_id),
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                text TEXT NOT NULL,
                ts INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Migration(format!("messages table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(format!("messages index: {e}")))?;

        Ok(())
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Session, sqlx::Error> {
    let count: i64 = row.try_get("questions_count")?;
    Ok(Session {
        id: row.try_get("session_id")?,
        created_at: row.try_get("created_at")?,
        email: row.try_get("email")?,
        profile: row.try_get("profile")?,
        questions_count: count.max(0) as u32,
    })
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn find_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            "SELECT session_id, created_at, email, profile, questions_count FROM sessions WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        row.as_ref()
            .map(session_from_row)
            .transpose()
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn create_session(&self, session_id: &str) -> Result<Session, StoreError> {
        let created_at = Utc::now().timestamp();

        sqlx::query("INSERT INTO sessions (session_id, created_at, questions_count) VALUES (?1, ?2, 0)")
            .bind(session_id)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        debug!("Inserted session {}", session_id);

        Ok(Session {
            id: session_id.to_string(),
            created_at,
            email: None,
            profile: None,
            questions_count: 0,
        })
    }

    async fn increment_questions(&self, session_id: &str) -> Result<u32, StoreError> {
        let count: Option<i64> = sqlx::query_scalar(
            "UPDATE sessions SET questions_count = questions_count + 1 WHERE session_id = ?1 RETURNING questions_count",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        count
            .map(|c| c.max(0) as u32)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))
    }
}

#[async_trait]
impl MessageLog for SqliteStore {
    async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
    ) -> Result<Message, StoreError> {
        let ts = Utc::now().timestamp();

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO messages (session_id, role, text, ts) VALUES (?1, ?2, ?3, ?4) RETURNING id",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(text)
        .bind(ts)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(Message {
            id,
            session_id: session_id.to_string(),
            role,
            text: text.to_string(),
            ts,
        })
    }
}
