//! SQLite memory store with FTS5 full-text search.
//!
//! Uses a single SQLite database file with two tables:
//! - `memories`: the raw memory texts
//! - `memories_fts`: FTS5 virtual table for BM25-ranked keyword search
//!
//! Triggers keep the FTS index in sync on insert/delete.

use async_trait::async_trait;
use anemone_core::error::MemoryError;
use anemone_core::memory::{MemoryEntry, MemoryStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::scoring;

/// A SQLite memory store with FTS5 full-text search.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let ephemeral = path.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal);
        if !ephemeral {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to ":memory:" is a separate database.
        let max_connections = if ephemeral { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite memory store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                iid         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT UNIQUE NOT NULL,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("memories table: {e}")))?;

        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
                content,
                content='memories',
                content_rowid='iid',
                tokenize='porter unicode61'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("FTS5 table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
                INSERT INTO memories_fts(rowid, content) VALUES (new.iid, new.content);
            END
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("insert trigger: {e}")))?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
                INSERT INTO memories_fts(memories_fts, rowid, content)
                VALUES ('delete', old.iid, old.content);
            END
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("delete trigger: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Build a safe FTS5 query from free text.
    ///
    /// Tokens are quoted to prevent FTS syntax injection and OR-joined so any
    /// shared term is a candidate; BM25 then ranks by overlap.
    fn fts_query(text: &str) -> String {
        scoring::tokenize(text)
            .into_iter()
            .map(|token| format!("\"{token}\""))
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, text: &str) -> Result<String, MemoryError> {
        let entry = MemoryEntry::new(text);

        sqlx::query("INSERT INTO memories (id, content, created_at) VALUES (?1, ?2, ?3)")
            .bind(&entry.id)
            .bind(&entry.content)
            .bind(entry.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        debug!("Stored memory {}", entry.id);
        Ok(entry.id)
    }

    async fn retrieve(&self, query: &str) -> Result<String, MemoryError> {
        let fts_query = Self::fts_query(query);
        if fts_query.is_empty() {
            return Ok(String::new());
        }

        let row = sqlx::query(
            r#"
            SELECT m.content, bm25(memories_fts) AS rank
            FROM memories_fts f
            JOIN memories m ON m.iid = f.rowid
            WHERE memories_fts MATCH ?1
            ORDER BY rank, m.iid DESC
            LIMIT 1
            "#,
        )
        .bind(&fts_query)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("FTS search: {e}")))?;

        match row {
            Some(r) => r
                .try_get("content")
                .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}"))),
            None => Ok(String::new()),
        }
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM memories")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| MemoryError::QueryFailed(format!("cnt column: {e}")))?;

        Ok(cnt as usize)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        sqlx::query("DELETE FROM memories")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("CLEAR failed: {e}")))?;

        Ok(())
    }
}
