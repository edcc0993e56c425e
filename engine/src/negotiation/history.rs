//! Conversation history port
//!
//! The engine only sees history through `HistoryStore`. The SQLite
//! implementation lives in `db::history`; tests can substitute their own.

use anyhow::Result;
use async_trait::async_trait;
use sdk::types::{Author, CorrelationId, HistoryEntry};

/// Bounded, append-only log of conversation turns keyed by correlation id
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Maximum number of entries kept per correlation id
    fn cap(&self) -> usize;

    /// Append one entry, then evict the oldest entries beyond `cap()`
    async fn append(
        &self,
        correlation_id: &CorrelationId,
        author: Author,
        text: &str,
    ) -> Result<()>;

    /// Append a user turn and its assistant reply together. Either both
    /// entries are stored or neither is.
    async fn append_exchange(
        &self,
        correlation_id: &CorrelationId,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<()>;

    /// Up to `max_turns` most recent entries, oldest first
    async fn load_recent(
        &self,
        correlation_id: &CorrelationId,
        max_turns: usize,
    ) -> Result<Vec<HistoryEntry>>;

    /// Delete the `count` oldest entries; returns how many rows went away
    async fn evict_oldest(&self, correlation_id: &CorrelationId, count: usize) -> Result<u64>;

    /// Number of stored entries
    async fn count(&self, correlation_id: &CorrelationId) -> Result<usize>;
}

/// Number of entries to evict so that `count` fits under `cap`
pub fn overflow(count: usize, cap: usize) -> usize {
    count.saturating_sub(cap)
}
