//! Memory store trait: persistent, retrievable agent memories.
//!
//! The store is content-addressable: callers save a text blob and get back
//! an opaque identifier chosen by the store, and retrieve the single text
//! that best matches a query. How "best" is computed (keyword overlap,
//! BM25, embeddings) is the store's business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;

/// A single stored memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Opaque identifier assigned by the store
    pub id: String,

    /// The remembered text
    pub content: String,

    /// When this memory was saved
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    /// A fresh entry with a generated identifier.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// The core MemoryStore trait.
///
/// Implementations: JSONL file, SQLite FTS5, in-memory (for testing), none (no-op).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The store name (e.g., "file", "sqlite", "none").
    fn name(&self) -> &str;

    /// Persist a text blob and return its identifier.
    async fn save(&self, text: &str) -> std::result::Result<String, MemoryError>;

    /// Return the best-matching stored text, or an empty string when nothing matches.
    async fn retrieve(&self, query: &str) -> std::result::Result<String, MemoryError>;

    /// Get total memory count.
    async fn count(&self) -> std::result::Result<usize, MemoryError>;

    /// Clear all memories.
    async fn clear(&self) -> std::result::Result<(), MemoryError>;
}
