//! Durable key-value storage for snapshots
//!
//! The store writes one text value under one key. Backends only need to be
//! durable across restarts; ordering is the store's job.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;

/// Storage collaborator
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Stored value for `key`, if any
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value for `key`
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local storage; contents die with the process
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every value ever written, oldest first
    pub fn history(&self) -> Vec<String> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        self.writes.lock().push(value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`; anything outside `[A-Za-z0-9_-]` becomes `_`
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("k").await.unwrap(), None);
        storage.set("k", "one").await.unwrap();
        storage.set("k", "two").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("two"));
        assert_eq!(storage.history(), vec!["one", "two"]);
        storage.remove("k").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_storage_persists() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::new(temp.path().join("nested"));
        storage.set("audio-expert-storage", "{}").await.unwrap();

        let reopened = FileStorage::new(temp.path().join("nested"));
        assert_eq!(
            reopened.get("audio-expert-storage").await.unwrap().as_deref(),
            Some("{}")
        );
        assert!(!storage
            .path_for("audio-expert-storage")
            .with_extension("json.tmp")
            .exists());
    }

    #[tokio::test]
    async fn test_file_storage_missing_key() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::new(temp.path());
        assert_eq!(storage.get("absent").await.unwrap(), None);
        storage.remove("absent").await.unwrap();
    }

    #[test]
    fn test_key_sanitized() {
        let storage = FileStorage::new("/tmp/store");
        assert_eq!(
            storage.path_for("../etc/passwd"),
            PathBuf::from("/tmp/store/___etc_passwd.json")
        );
    }
}
