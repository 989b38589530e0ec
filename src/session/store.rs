//! Turn storage behind the [`MessageStore`] contract.
//!
//! One store instance is shared across all sessions; every operation is
//! keyed by session id and state never leaks between ids. Two backends:
//! [`InMemoryMessageStore`] for process-local working memory and
//! [`SqliteMessageStore`] for working memory that survives restarts (a
//! manager rebuilt over a non-empty persisted history resumes mid-phase).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::RwLock;

use super::{Role, Turn, TurnMetadata};

/// Errors returned by message store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The turn failed validation (empty content) before touching the store.
    #[error("invalid turn: {0}")]
    InvalidTurn(String),
    /// Backing store I/O failure. Distinct from validation; retryable.
    #[error("message store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Append-only, ordered record of turns, isolated per session id.
///
/// All operations touch the backing store (which may be remote) and must be
/// treated as fallible I/O.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a validated turn to a session's history.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTurn`] if content is empty after
    /// trimming, [`StoreError::Unavailable`] on I/O failure.
    async fn add_message(&self, session_id: &str, turn: Turn) -> Result<(), StoreError>;

    /// The full ordered turn sequence for a session, oldest first.
    ///
    /// Side-effect-free; an unknown session id yields an empty sequence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] on I/O failure.
    async fn messages(&self, session_id: &str) -> Result<Vec<Turn>, StoreError>;

    /// Empty a session's history. Idempotent; used only at session end.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] on I/O failure.
    async fn clear(&self, session_id: &str) -> Result<(), StoreError>;
}

fn validate_content(turn: &Turn) -> Result<(), StoreError> {
    if turn.content.trim().is_empty() {
        return Err(StoreError::InvalidTurn(
            "turn content is empty after trimming".to_owned(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Process-local store backed by a per-session map.
#[derive(Default)]
pub struct InMemoryMessageStore {
    sessions: RwLock<HashMap<String, Vec<Turn>>>,
}

impl InMemoryMessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn add_message(&self, session_id: &str, turn: Turn) -> Result<(), StoreError> {
        validate_content(&turn)?;
        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id.to_owned()).or_default().push(turn);
        Ok(())
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS session_turns (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id   TEXT NOT NULL,
    role         TEXT NOT NULL,
    content      TEXT NOT NULL,
    action_items TEXT NOT NULL DEFAULT '[]',
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_session_turns_session ON session_turns(session_id);
";

/// Parse an RFC 3339 timestamp or return now.
fn parse_rfc3339_or_now(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Durable store backed by a SQLite table, one row per turn.
pub struct SqliteMessageStore {
    db: SqlitePool,
}

impl SqliteMessageStore {
    /// Open (creating if missing) a store backed by a database file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be opened
    /// or the schema cannot be applied.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Self::with_pool(pool).await
    }

    /// Open an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the pool cannot be created.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);
        // A single connection — each SQLite :memory: connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { db: pool })
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn add_message(&self, session_id: &str, turn: Turn) -> Result<(), StoreError> {
        validate_content(&turn)?;
        let action_items = serde_json::to_string(&turn.metadata.action_items)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        sqlx::query(
            "INSERT INTO session_turns (session_id, role, content, action_items, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(session_id)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(action_items)
        .bind(turn.timestamp.to_rfc3339())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT role, content, action_items, created_at \
             FROM session_turns WHERE session_id = ?1 ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.db)
        .await?;

        let mut turns = Vec::with_capacity(rows.len());
        for (role, content, action_items, created_at) in rows {
            turns.push(Turn {
                role: Role::parse(&role)?,
                content,
                metadata: TurnMetadata {
                    // Tolerate rows written before the metadata column carried JSON.
                    action_items: serde_json::from_str(&action_items).unwrap_or_default(),
                },
                timestamp: parse_rfc3339_or_now(&created_at),
            });
        }
        Ok(turns)
    }

    async fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM session_turns WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
