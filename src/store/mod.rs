pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use sqlite::SqliteStore;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("schema setup failed: {0}")]
    Migration(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("session '{0}' not found")]
    SessionNotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversational context tracking free-tier usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Unix seconds.
    pub created_at: i64,
    pub email: Option<String>,
    pub profile: Option<String>,
    pub questions_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub text: String,
    /// Unix seconds.
    pub ts: i64,
}

/// Persistence for sessions and their question counters.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session by identifier.
    async fn find_session(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Insert a fresh session with a zero counter.
    async fn create_session(&self, session_id: &str) -> Result<Session, StoreError>;

    /// Atomically add one to the session's counter and return the new value.
    ///
    /// Concurrent calls for the same session never observe the same result.
    async fn increment_questions(&self, session_id: &str) -> Result<u32, StoreError>;
}

/// Append-only record of conversation turns.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
    ) -> Result<Message, StoreError>;
}
