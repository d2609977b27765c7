//! File-based memory store: persistent JSON-lines storage.
//!
//! Each line is a JSON-encoded `MemoryEntry`. Entries are loaded once at
//! construction; saves append a single line, `clear` truncates the file.
//!
//! Storage location: `~/.anemone/memory/memories.jsonl`

use async_trait::async_trait;
use anemone_core::error::MemoryError;
use anemone_core::memory::{MemoryEntry, MemoryStore};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::scoring;

/// A file-backed memory store using JSONL (one JSON object per line).
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<Vec<MemoryEntry>>,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// If the file exists, entries are loaded from it.
    /// If it does not, the store starts empty and the file is created on first save.
    pub fn new(path: PathBuf) -> Self {
        let entries = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = entries.len(), "File memory store loaded");
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    /// Default file name inside a memory directory.
    pub fn default_path(dir: &Path) -> PathBuf {
        dir.join("memories.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Vec<MemoryEntry> {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Vec::new();
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<MemoryEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted memory entry");
                    None
                }
            })
            .collect()
    }

    async fn ensure_parent(&self) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }
        Ok(())
    }

    async fn append_line(&self, entry: &MemoryEntry) -> Result<(), MemoryError> {
        self.ensure_parent().await?;

        let mut line = serde_json::to_string(entry)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize memory entry: {e}")))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open memory file: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))?;
        file.flush()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to flush memory file: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, text: &str) -> Result<String, MemoryError> {
        let entry = MemoryEntry::new(text);
        let id = entry.id.clone();

        // Hold the write lock across the append so lines never interleave.
        let mut entries = self.entries.write().await;
        self.append_line(&entry).await?;
        entries.push(entry);
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
        let mut entries = self.entries.write().await;
        self.ensure_parent().await?;
        tokio::fs::write(&self.path, b"")
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to truncate memory file: {e}")))?;
        entries.clear();
        Ok(())
    }
}
