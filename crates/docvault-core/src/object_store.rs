//! Object store backends for encrypted blobs.
//!
//! The store only ever sees ciphertext. [`MemoryObjectStore`] backs tests and
//! embedded use; [`FsObjectStore`] keeps one file per key under a root directory.

use crate::error::{VaultError, VaultResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Put/get/delete of opaque blobs by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous object.
    async fn put(&self, key: &str, data: Bytes) -> VaultResult<()>;
    /// Fetch an object; [`VaultError::NotFound`] if absent.
    async fn get(&self, key: &str) -> VaultResult<Bytes>;
    /// Remove an object; [`VaultError::NotFound`] if absent.
    async fn delete(&self, key: &str) -> VaultResult<()>;
    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> VaultResult<bool>;
}

/// Operation counters of the in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryObjectStoreStats {
    /// Number of put operations
    pub puts: u64,
    /// Number of get operations
    pub gets: u64,
    /// Number of delete operations
    pub deletes: u64,
}

#[derive(Default)]
struct MemoryInner {
    objects: HashMap<String, Bytes>,
    stats: MemoryObjectStoreStats,
}

/// In-memory object store.
#[derive(Default)]
pub struct MemoryObjectStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Operation counters.
    pub async fn stats(&self) -> MemoryObjectStoreStats {
        self.inner.read().await.stats.clone()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.inner.read().await.objects.len()
    }

    /// True if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: Bytes) -> VaultResult<()> {
        let mut inner = self.inner.write().await;
        inner.stats.puts += 1;
        debug!(key, bytes = data.len(), "memory put");
        inner.objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> VaultResult<Bytes> {
        let mut inner = self.inner.write().await;
        inner.stats.gets += 1;
        inner
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| VaultError::not_found("blob", key))
    }

    async fn delete(&self, key: &str) -> VaultResult<()> {
        let mut inner = self.inner.write().await;
        inner.stats.deletes += 1;
        inner
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| VaultError::not_found("blob", key))
    }

    async fn exists(&self, key: &str) -> VaultResult<bool> {
        Ok(self.inner.read().await.objects.contains_key(key))
    }
}

/// Filesystem object store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`; the directory is created on first put.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under the root. Only plain relative segments are allowed.
    fn resolve(&self, key: &str) -> VaultResult<PathBuf> {
        let rel = Path::new(key);
        let valid = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(VaultError::Storage(format!("invalid object key {:?}", key)));
        }
        Ok(self.root.join(rel))
    }
}

fn map_not_found(err: std::io::Error, key: &str) -> VaultError {
    if err.kind() == std::io::ErrorKind::NotFound {
        VaultError::not_found("blob", key)
    } else {
        VaultError::Io(err)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, data: Bytes) -> VaultResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("partial");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, bytes = data.len(), "fs put");
        Ok(())
    }

    async fn get(&self, key: &str) -> VaultResult<Bytes> {
        let path = self.resolve(key)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| map_not_found(e, key))?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, key: &str) -> VaultResult<()> {
        let path = self.resolve(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| map_not_found(e, key))
    }

    async fn exists(&self, key: &str) -> VaultResult<bool> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}
