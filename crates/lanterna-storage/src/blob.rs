use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::key::BytesKey;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Keyed map from [`BytesKey`] to assembled segment files on disk.
///
/// Clone is cheap; all clones share the same map.
#[derive(Clone, Debug)]
pub struct BlobStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    entries: Mutex<HashMap<BytesKey, PathBuf>>,
}

impl BlobStore {
    /// Store rooted at the system temp directory.
    pub fn new() -> Self {
        Self::with_root(std::env::temp_dir())
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: root.into(),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Path the given blob would be written to.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.inner.root.join(filename)
    }

    /// True if the key is already cached.
    pub fn contains(&self, key: &BytesKey) -> bool {
        self.inner.entries.lock().contains_key(key)
    }

    /// Path of a cached blob, if present.
    pub fn lookup(&self, key: &BytesKey) -> Option<PathBuf> {
        self.inner.entries.lock().get(key).cloned()
    }

    /// Write `data` under `filename` and record it for `key`.
    ///
    /// Returns the file path. An existing entry for the key is replaced in
    /// the map; its file is left alone.
    pub async fn put(&self, key: BytesKey, filename: &str, data: &[u8]) -> StorageResult<PathBuf> {
        let path = self.path_for(filename);
        tokio::fs::write(&path, data).await?;
        debug!(key = ?key, path = %path.display(), bytes = data.len(), "blob store: wrote entry");
        self.inner.entries.lock().insert(key, path.clone());
        Ok(path)
    }

    /// Drop every entry and best-effort delete the backing files.
    pub async fn purge(&self) {
        let drained: Vec<PathBuf> = {
            let mut entries = self.inner.entries.lock();
            entries.drain().map(|(_, path)| path).collect()
        };

        for path in drained {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "blob store: purge failed to delete file");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }
}

impl Default for BlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u64) -> BytesKey {
        BytesKey::new("seg.m4s", n, Some(100))
    }

    #[tokio::test]
    async fn put_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::with_root(dir.path());

        assert!(!store.contains(&key(0)));
        let path = store.put(key(0), "s_0.mp4", b"payload").await.unwrap();

        assert!(store.contains(&key(0)));
        assert_eq!(store.lookup(&key(0)), Some(path.clone()));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn purge_clears_entries_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::with_root(dir.path());

        let p0 = store.put(key(0), "s_0.mp4", b"a").await.unwrap();
        let p1 = store.put(key(100), "s_1.mp4", b"b").await.unwrap();
        assert_eq!(store.len(), 2);

        store.purge().await;
        assert!(store.is_empty());
        assert!(!p0.exists());
        assert!(!p1.exists());
    }

    #[tokio::test]
    async fn clones_share_the_map() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::with_root(dir.path());
        let clone = store.clone();

        store.put(key(0), "s_0.mp4", b"a").await.unwrap();
        assert!(clone.contains(&key(0)));
    }
}
