//! No-op memory store: disables persistent memory entirely.

use async_trait::async_trait;
use anemone_core::error::MemoryError;
use anemone_core::memory::MemoryStore;

/// A store that remembers nothing; every retrieval comes back empty.
pub struct NoopStore;

#[async_trait]
impl MemoryStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn save(&self, _text: &str) -> Result<String, MemoryError> {
        Ok(String::new())
    }

    async fn retrieve(&self, _query: &str) -> Result<String, MemoryError> {
        Ok(String::new())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(0)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        Ok(())
    }
}
