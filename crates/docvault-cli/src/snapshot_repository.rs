//! Document repository persisted as one JSON snapshot file.
//!
//! Every mutation is applied to a copy of the tables, written to a temp file
//! and renamed over the snapshot; the in-memory tables change only after the
//! rename succeeded.

use async_trait::async_trait;
use docvault_core::{
    ChunkId, Document, DocumentChunk, DocumentId, DocumentRepository, RepositoryState,
    VaultError, VaultResult,
};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// JSON snapshot repository for single-process use.
#[derive(Debug)]
pub struct SnapshotRepository {
    path: PathBuf,
    state: RwLock<RepositoryState>,
}

impl SnapshotRepository {
    /// Load the snapshot at `path`, or start empty if it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> VaultResult<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RepositoryState::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "catalog loaded");
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Snapshot file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &RepositoryState) -> VaultResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply `f` to a copy, persist it, then publish it.
    async fn mutate<T, F>(&self, f: F) -> VaultResult<T>
    where
        F: FnOnce(&mut RepositoryState) -> VaultResult<T>,
    {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(out)
    }
}

#[async_trait]
impl DocumentRepository for SnapshotRepository {
    async fn create_document(&self, document: Document) -> VaultResult<()> {
        self.mutate(|s| {
            if s.documents.contains_key(&document.id) {
                return Err(VaultError::Storage(format!(
                    "document {} already exists",
                    document.id
                )));
            }
            s.documents.insert(document.id, document);
            Ok(())
        })
        .await
    }

    async fn get_document(&self, id: DocumentId) -> VaultResult<Document> {
        self.state
            .read()
            .await
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| VaultError::not_found("document", id))
    }

    async fn update_document(&self, document: Document) -> VaultResult<()> {
        self.mutate(|s| match s.documents.get_mut(&document.id) {
            Some(slot) => {
                *slot = document;
                Ok(())
            }
            None => Err(VaultError::not_found("document", document.id)),
        })
        .await
    }

    async fn delete_document(&self, id: DocumentId) -> VaultResult<()> {
        self.mutate(|s| {
            s.documents
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| VaultError::not_found("document", id))
        })
        .await
    }

    async fn list_documents(&self, workspace_id: &str) -> VaultResult<Vec<Document>> {
        Ok(self.state.read().await.workspace_documents(workspace_id))
    }

    async fn insert_chunks(&self, chunks: Vec<DocumentChunk>) -> VaultResult<()> {
        self.mutate(|s| s.insert_chunks(chunks)).await
    }

    async fn delete_chunks(&self, document_id: DocumentId) -> VaultResult<usize> {
        self.mutate(|s| Ok(s.delete_chunks(document_id))).await
    }

    async fn get_chunk(&self, id: ChunkId) -> VaultResult<DocumentChunk> {
        self.state
            .read()
            .await
            .find_chunk(id)
            .cloned()
            .ok_or_else(|| VaultError::not_found("chunk", id))
    }

    async fn list_chunks(&self, document_id: DocumentId) -> VaultResult<Vec<DocumentChunk>> {
        Ok(self.state.read().await.document_chunks(document_id))
    }
}
