//! Memory store implementations for Anemone.
//!
//! All stores implement `anemone_core::MemoryStore`. [`build_from_config`]
//! picks one from the `[memory]` config section.

pub mod file_backend;
pub mod in_memory;
pub mod noop;
pub mod scoring;
pub mod seed;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;
pub use noop::NoopStore;
pub use seed::{seed, SEED_MEMORIES};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use std::sync::Arc;

use anemone_config::{AppConfig, MemoryConfig};
use anemone_core::error::MemoryError;
use anemone_core::memory::MemoryStore;

/// Build the configured memory store.
pub async fn build_from_config(config: &MemoryConfig) -> Result<Arc<dyn MemoryStore>, MemoryError> {
    let dir = AppConfig::memory_dir();
    match config.backend.as_str() {
        "file" => {
            let path = config
                .path
                .clone()
                .unwrap_or_else(|| FileStore::default_path(&dir));
            Ok(Arc::new(FileStore::new(path)))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config
                .path
                .clone()
                .unwrap_or_else(|| dir.join("memory.db"));
            ensure_parent(&path)?;
            let url = format!("sqlite://{}", path.display());
            Ok(Arc::new(SqliteStore::new(&url).await?))
        }
        "in_memory" => Ok(Arc::new(InMemoryStore::new())),
        "none" => Ok(Arc::new(NoopStore)),
        other => Err(MemoryError::Unavailable(format!(
            "unknown memory backend '{other}'"
        ))),
    }
}

#[cfg(feature = "sqlite")]
fn ensure_parent(path: &std::path::Path) -> Result<(), MemoryError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| MemoryError::Storage(format!("Failed to create memory directory: {e}")))?;
    }
    Ok(())
}
