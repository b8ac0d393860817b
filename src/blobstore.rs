//! Blob storage abstraction.
//!
//! The [`BlobStore`] trait is the persistence seam for everything except
//! vectors: session metadata, document metadata, and raw document
//! payloads are all JSON or byte blobs stored under `/`-separated keys.
//!
//! Implementations:
//! - **[`MemoryBlobStore`]** — `BTreeMap` behind an `RwLock`; used by
//!   tests and available for ephemeral runs.
//! - **[`LocalBlobStore`]** — files under a root directory, one file per
//!   key; listing walks the tree with `walkdir`.
//! - **S3** — see [`crate::s3`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Abstract blob storage.
///
/// Keys are `/`-separated paths (`sessions/<id>/bucket1/<doc>`). All
/// operations are async to match the network-backed implementations;
/// the in-memory and local stores return immediately-ready futures.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a key, overwriting any existing blob.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Fetch the blob stored under a key. Errors when the key is absent.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// List all keys starting with `prefix`, in lexicographic order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete every blob whose key starts with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;
}

/// In-memory blob store for tests and ephemeral runs.
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs
            .write()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .with_context(|| format!("blob not found: {}", key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        self.blobs
            .write()
            .unwrap()
            .retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}

/// Blob store backed by a local directory, one file per key.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create blob root {}", root.display()))?;
        Ok(Self { root })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/').filter(|p| !p.is_empty() && *p != "..") {
            path.push(part);
        }
        path
    }

    fn path_key(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.key_path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, bytes).with_context(|| format!("failed to write {}", key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        std::fs::read(self.key_path(key)).with_context(|| format!("blob not found: {}", key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        if !self.root.exists() {
            return Ok(keys);
        }
        for entry in walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(key) = self.path_key(entry.path()) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        for key in self.list(prefix).await? {
            let path = self.key_path(&key);
            std::fs::remove_file(&path).with_context(|| format!("failed to delete {}", key))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise_store(store: &dyn BlobStore) {
        store.put("a/b/one.json", b"1").await.unwrap();
        store.put("a/b/two.json", b"2").await.unwrap();
        store.put("a/c/three.json", b"3").await.unwrap();

        assert_eq!(store.get("a/b/one.json").await.unwrap(), b"1");
        assert!(store.get("a/b/missing.json").await.is_err());

        let keys = store.list("a/b/").await.unwrap();
        assert_eq!(keys, vec!["a/b/one.json", "a/b/two.json"]);

        store.delete_prefix("a/b/").await.unwrap();
        assert!(store.list("a/b/").await.unwrap().is_empty());
        assert_eq!(store.list("a/").await.unwrap(), vec!["a/c/three.json"]);
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryBlobStore::new();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn test_local_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).unwrap();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryBlobStore::new();
        store.put("k", b"old").await.unwrap();
        store.put("k", b"new").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), b"new");
    }
}
