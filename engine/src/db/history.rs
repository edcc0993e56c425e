//! Conversation history persistence
//!
//! Stores the bounded transcript of every conversation thread. Appends,
//! counting and cap-driven eviction share one transaction, so a reader never
//! sees more than `cap` entries for a correlation id.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sdk::types::{Author, CorrelationId, HistoryEntry};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use super::unix_now;
use crate::negotiation::history::{overflow, HistoryStore};

/// History repository for database operations
pub struct HistoryRepository {
    pool: SqlitePool,
    cap: usize,
}

impl HistoryRepository {
    /// Create a new history repository keeping at most `cap` entries per conversation
    pub fn new(pool: SqlitePool, cap: usize) -> Self {
        Self {
            pool,
            cap: cap.max(1),
        }
    }

    /// Insert `entries` in order, then trim to `cap`, all in one transaction
    async fn write_entries(
        &self,
        correlation_id: &CorrelationId,
        entries: &[(Author, &str)],
    ) -> Result<()> {
        let now = unix_now()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin history transaction")?;

        for (author, text) in entries {
            insert_entry(&mut tx, correlation_id, *author, text, now).await?;
        }

        let count = count_entries(&mut tx, correlation_id).await?;
        let excess = overflow(count, self.cap);
        if excess > 0 {
            let removed = delete_oldest(&mut tx, correlation_id, excess).await?;
            debug!(
                "Evicted {} history entries for {} (cap {})",
                removed, correlation_id, self.cap
            );
        }

        tx.commit()
            .await
            .context("Failed to commit history append")?;

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for HistoryRepository {
    fn cap(&self) -> usize {
        self.cap
    }

    async fn append(
        &self,
        correlation_id: &CorrelationId,
        author: Author,
        text: &str,
    ) -> Result<()> {
        self.write_entries(correlation_id, &[(author, text)]).await
    }

    async fn append_exchange(
        &self,
        correlation_id: &CorrelationId,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<()> {
        self.write_entries(
            correlation_id,
            &[(Author::User, user_text), (Author::Assistant, assistant_text)],
        )
        .await
    }

    async fn load_recent(
        &self,
        correlation_id: &CorrelationId,
        max_turns: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT turn_index, author, content, created_at
            FROM conversation_history
            WHERE correlation_id = ?
            ORDER BY turn_index DESC
            LIMIT ?
            "#,
        )
        .bind(correlation_id.as_str())
        .bind(max_turns as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load conversation history")?;

        let mut entries = rows
            .into_iter()
            .map(|r| {
                let author: String = r.get("author");
                Ok(HistoryEntry {
                    turn_index: r.get("turn_index"),
                    author: Author::parse(&author)
                        .ok_or_else(|| anyhow!("Unknown history author '{}'", author))?,
                    text: r.get("content"),
                    created_at: r.get("created_at"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Newest-first from the query, transcript order for callers
        entries.reverse();
        Ok(entries)
    }

    async fn evict_oldest(&self, correlation_id: &CorrelationId, count: usize) -> Result<u64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        delete_oldest(&mut conn, correlation_id, count).await
    }

    async fn count(&self, correlation_id: &CorrelationId) -> Result<usize> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        count_entries(&mut conn, correlation_id).await
    }
}

async fn insert_entry(
    conn: &mut SqliteConnection,
    correlation_id: &CorrelationId,
    author: Author,
    text: &str,
    created_at: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO conversation_history (correlation_id, turn_index, author, content, created_at)
        VALUES (
            ?,
            (SELECT COALESCE(MAX(turn_index) + 1, 0) FROM conversation_history WHERE correlation_id = ?),
            ?, ?, ?
        )
        "#,
    )
    .bind(correlation_id.as_str())
    .bind(correlation_id.as_str())
    .bind(author.as_str())
    .bind(text)
    .bind(created_at)
    .execute(&mut *conn)
    .await
    .context("Failed to append history entry")?;

    Ok(())
}

async fn count_entries(
    conn: &mut SqliteConnection,
    correlation_id: &CorrelationId,
) -> Result<usize> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM conversation_history WHERE correlation_id = ?")
            .bind(correlation_id.as_str())
            .fetch_one(&mut *conn)
            .await
            .context("Failed to count history entries")?;

    Ok(count as usize)
}

async fn delete_oldest(
    conn: &mut SqliteConnection,
    correlation_id: &CorrelationId,
    count: usize,
) -> Result<u64> {
    if count == 0 {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        DELETE FROM conversation_history
        WHERE id IN (
            SELECT id FROM conversation_history
            WHERE correlation_id = ?
            ORDER BY turn_index ASC
            LIMIT ?
        )
        "#,
    )
    .bind(correlation_id.as_str())
    .bind(count as i64)
    .execute(&mut *conn)
    .await
    .context("Failed to evict history entries")?;

    Ok(result.rows_affected())
}
