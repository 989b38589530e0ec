//! Finished-conversation persistence.
//!
//! After a session ends, the outer layer hands the transcript and summary to
//! the [`ConversationArchive`] so the user can browse history later. The
//! session core never calls this module — working memory and the archive are
//! deliberately separate stores with separate lifecycles.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::session::{Summary, Turn};

const TITLE_MAX_CHARS: usize = 100;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS conversations (
    id          TEXT PRIMARY KEY,
    owner_id    TEXT NOT NULL,
    session_id  TEXT NOT NULL,
    title       TEXT NOT NULL,
    turns       TEXT NOT NULL,
    summary     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conversations_owner ON conversations(owner_id, created_at);
";

/// A persisted conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Record id (UUID).
    pub id: String,
    /// Authenticated owner the record belongs to.
    pub owner_id: String,
    /// The session this conversation ran under.
    pub session_id: String,
    /// Display title — the first user turn, truncated.
    pub title: String,
    /// Full transcript at session end.
    pub turns: Vec<Turn>,
    /// Structured summary produced at session end.
    pub summary: Summary,
    /// When the record was saved.
    pub created_at: DateTime<Utc>,
}

/// Sort order for history listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first.
    Asc,
    /// Newest first (the history view default).
    #[default]
    Desc,
}

impl SortOrder {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Filter, sort, and pagination options for [`ConversationArchive::list_conversations`].
#[derive(Debug, Clone)]
pub struct ListFilter {
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub until: Option<DateTime<Utc>>,
    /// Sort order by `created_at`.
    pub sort: SortOrder,
    /// Zero-based page index.
    pub page: u32,
    /// Records per page.
    pub page_size: u32,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            from: None,
            until: None,
            sort: SortOrder::Desc,
            page: 0,
            page_size: 20,
        }
    }
}

/// SQLite-backed archive of finished conversations.
pub struct ConversationArchive {
    db: SqlitePool,
}

impl ConversationArchive {
    /// Open (creating if missing) an archive backed by a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be applied.
    pub async fn open(path: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(opts)
            .await
            .context("failed to open conversation archive")?;
        Self::with_pool(pool).await
    }

    /// Open an in-memory archive for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created.
    pub async fn open_in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .context("failed to open in-memory archive")?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to apply archive schema")?;
        Ok(Self { db: pool })
    }

    /// Persist a finished conversation for an owner.
    ///
    /// The title is the first user turn truncated to 100 characters, or
    /// a placeholder for transcripts with no user turn.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the insert fails.
    pub async fn save_conversation(
        &self,
        owner_id: &str,
        session_id: &str,
        turns: &[Turn],
        summary: &Summary,
    ) -> Result<ConversationRecord> {
        self.save_conversation_at(owner_id, session_id, turns, summary, Utc::now())
            .await
    }

    async fn save_conversation_at(
        &self,
        owner_id: &str,
        session_id: &str,
        turns: &[Turn],
        summary: &Summary,
        created_at: DateTime<Utc>,
    ) -> Result<ConversationRecord> {
        let record = ConversationRecord {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_owned(),
            session_id: session_id.to_owned(),
            title: derive_title(turns),
            turns: turns.to_vec(),
            summary: summary.clone(),
            created_at,
        };

        let turns_json =
            serde_json::to_string(&record.turns).context("failed to serialize turns")?;
        let summary_json =
            serde_json::to_string(&record.summary).context("failed to serialize summary")?;

        sqlx::query(
            "INSERT INTO conversations (id, owner_id, session_id, title, turns, summary, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(&record.session_id)
        .bind(&record.title)
        .bind(turns_json)
        .bind(summary_json)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.db)
        .await
        .context("failed to save conversation")?;

        debug!(id = %record.id, owner_id, "conversation archived");
        Ok(record)
    }

    /// List an owner's conversations with date-range, sort, and pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or record decoding fails.
    pub async fn list_conversations(
        &self,
        owner_id: &str,
        filter: &ListFilter,
    ) -> Result<Vec<ConversationRecord>> {
        let query = format!(
            "SELECT id, owner_id, session_id, title, turns, summary, created_at \
             FROM conversations \
             WHERE owner_id = ?1 \
               AND (?2 IS NULL OR created_at >= ?2) \
               AND (?3 IS NULL OR created_at <= ?3) \
             ORDER BY created_at {} \
             LIMIT ?4 OFFSET ?5",
            filter.sort.as_sql()
        );

        let offset = i64::from(filter.page).saturating_mul(i64::from(filter.page_size));
        let rows: Vec<ConversationRow> = sqlx::query_as(&query)
            .bind(owner_id)
            .bind(filter.from.map(|t| t.to_rfc3339()))
            .bind(filter.until.map(|t| t.to_rfc3339()))
            .bind(i64::from(filter.page_size))
            .bind(offset)
            .fetch_all(&self.db)
            .await
            .context("failed to list conversations")?;

        rows.into_iter().map(decode_row).collect()
    }

    /// Fetch one conversation, scoped to its owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or record decoding fails.
    pub async fn get_conversation(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<ConversationRecord>> {
        let row: Option<ConversationRow> = sqlx::query_as(
            "SELECT id, owner_id, session_id, title, turns, summary, created_at \
             FROM conversations WHERE id = ?1 AND owner_id = ?2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await
        .context("failed to fetch conversation")?;

        row.map(decode_row).transpose()
    }

    /// Delete one conversation, scoped to its owner.
    ///
    /// Returns whether a record was actually removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_conversation(&self, id: &str, owner_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?1 AND owner_id = ?2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.db)
            .await
            .context("failed to delete conversation")?;
        Ok(result.rows_affected() > 0)
    }
}

type ConversationRow = (String, String, String, String, String, String, String);

fn decode_row(row: ConversationRow) -> Result<ConversationRecord> {
    let (id, owner_id, session_id, title, turns, summary, created_at) = row;
    Ok(ConversationRecord {
        id,
        owner_id,
        session_id,
        title,
        turns: serde_json::from_str(&turns).context("failed to decode stored turns")?,
        summary: serde_json::from_str(&summary).context("failed to decode stored summary")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .context("failed to parse stored timestamp")?
            .with_timezone(&Utc),
    })
}

fn derive_title(turns: &[Turn]) -> String {
    turns
        .iter()
        .find(|t| t.role == crate::session::Role::User)
        .map(|t| t.content.chars().take(TITLE_MAX_CHARS).collect())
        .unwrap_or_else(|| "New Conversation".to_owned())
}
