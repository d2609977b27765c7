//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use anemone_core::error::MemoryError;
use anemone_core::memory::{MemoryEntry, MemoryStore};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::scoring;

/// An in-memory store that keeps memories in a Vec.
/// Nothing survives the process.
pub struct InMemoryStore {
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save(&self, text: &str) -> Result<String, MemoryError> {
        let entry = MemoryEntry::new(text);
        let id = entry.id.clone();
        self.entries.write().await.push(entry);
        Ok(id)
    }

    async fn retrieve(&self, query: &str) -> Result<String, MemoryError> {
        let entries = self.entries.read().await;
        Ok(scoring::best_match(&entries, query)
            .map(|e| e.content.clone())
            .unwrap_or_default())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_retrieve() {
        let mem = InMemoryStore::new();
        let id = mem.save("Rust is a systems language").await.unwrap();
        assert!(!id.is_empty());

        let found = mem.retrieve("systems").await.unwrap();
        assert_eq!(found, "Rust is a systems language");
    }

    #[tokio::test]
    async fn retrieve_picks_best_of_many() {
        let mem = InMemoryStore::new();
        mem.save("Rust is great for systems programming").await.unwrap();
        mem.save("Python is great for scripting").await.unwrap();
        mem.save("JavaScript runs in the browser").await.unwrap();

        let found = mem.retrieve("scripting in python").await.unwrap();
        assert!(found.starts_with("Python"));
    }

    #[tokio::test]
    async fn no_overlap_is_empty() {
        let mem = InMemoryStore::new();
        mem.save("Bartholomew is missing").await.unwrap();
        assert_eq!(mem.retrieve("weather forecast").await.unwrap(), "");
    }

    #[tokio::test]
    async fn clear_all() {
        let mem = InMemoryStore::new();
        mem.save("Entry 1").await.unwrap();
        mem.save("Entry 2").await.unwrap();
        assert_eq!(mem.count().await.unwrap(), 2);

        mem.clear().await.unwrap();
        assert_eq!(mem.count().await.unwrap(), 0);
    }
}
