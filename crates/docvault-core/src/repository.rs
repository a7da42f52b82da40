//! Persistence seam for documents and their chunks.

use crate::document::{ChunkId, Document, DocumentChunk, DocumentId};
use crate::error::{VaultError, VaultResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// CRUD for documents, batch insert and delete-all for chunks.
///
/// `insert_chunks` is atomic per call: either every chunk of the batch
/// becomes visible or none does.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a new document; fails if the id is taken.
    async fn create_document(&self, document: Document) -> VaultResult<()>;
    /// Fetch a document by id.
    async fn get_document(&self, id: DocumentId) -> VaultResult<Document>;
    /// Replace an existing document record.
    async fn update_document(&self, document: Document) -> VaultResult<()>;
    /// Remove a document record. Chunks are removed separately.
    async fn delete_document(&self, id: DocumentId) -> VaultResult<()>;
    /// Documents of a workspace, oldest first.
    async fn list_documents(&self, workspace_id: &str) -> VaultResult<Vec<Document>>;
    /// Persist one batch of chunks.
    async fn insert_chunks(&self, chunks: Vec<DocumentChunk>) -> VaultResult<()>;
    /// Remove every chunk of a document; returns how many were removed.
    async fn delete_chunks(&self, document_id: DocumentId) -> VaultResult<usize>;
    /// Fetch a chunk by id.
    async fn get_chunk(&self, id: ChunkId) -> VaultResult<DocumentChunk>;
    /// Chunks of a document ordered by index.
    async fn list_chunks(&self, document_id: DocumentId) -> VaultResult<Vec<DocumentChunk>>;
}

/// Plain tables behind [`MemoryRepository`]; also the on-disk snapshot layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryState {
    /// Documents by id
    pub documents: HashMap<DocumentId, Document>,
    /// Chunks per document, keyed by index
    pub chunks: HashMap<DocumentId, BTreeMap<u32, DocumentChunk>>,
}

impl RepositoryState {
    /// Apply a batch insert, all or nothing.
    pub fn insert_chunks(&mut self, chunks: Vec<DocumentChunk>) -> VaultResult<()> {
        for (i, chunk) in chunks.iter().enumerate() {
            if !self.documents.contains_key(&chunk.document_id) {
                return Err(VaultError::not_found("document", chunk.document_id));
            }
            let taken = self
                .chunks
                .get(&chunk.document_id)
                .is_some_and(|c| c.contains_key(&chunk.chunk_index))
                || chunks[..i].iter().any(|c| {
                    c.document_id == chunk.document_id && c.chunk_index == chunk.chunk_index
                });
            if taken {
                return Err(VaultError::Storage(format!(
                    "chunk index {} already exists for document {}",
                    chunk.chunk_index, chunk.document_id
                )));
            }
        }
        for chunk in chunks {
            self.chunks
                .entry(chunk.document_id)
                .or_default()
                .insert(chunk.chunk_index, chunk);
        }
        Ok(())
    }

    /// Remove all chunks of a document.
    pub fn delete_chunks(&mut self, document_id: DocumentId) -> usize {
        self.chunks
            .remove(&document_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Look up a chunk by id.
    pub fn find_chunk(&self, id: ChunkId) -> Option<&DocumentChunk> {
        self.chunks
            .values()
            .flat_map(|c| c.values())
            .find(|c| c.id == id)
    }

    /// Documents of a workspace ordered by creation time, then id.
    pub fn workspace_documents(&self, workspace_id: &str) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .documents
            .values()
            .filter(|d| d.workspace_id == workspace_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        docs
    }

    /// Chunks of a document in index order.
    pub fn document_chunks(&self, document_id: DocumentId) -> Vec<DocumentChunk> {
        self.chunks
            .get(&document_id)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// In-memory repository.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<RepositoryState>,
}

impl MemoryRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored chunks across documents.
    pub async fn chunk_count(&self) -> usize {
        self.state.read().await.chunks.values().map(|c| c.len()).sum()
    }
}

#[async_trait]
impl DocumentRepository for MemoryRepository {
    async fn create_document(&self, document: Document) -> VaultResult<()> {
        let mut state = self.state.write().await;
        if state.documents.contains_key(&document.id) {
            return Err(VaultError::Storage(format!(
                "document {} already exists",
                document.id
            )));
        }
        state.documents.insert(document.id, document);
        Ok(())
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
        let mut state = self.state.write().await;
        match state.documents.get_mut(&document.id) {
            Some(slot) => {
                *slot = document;
                Ok(())
            }
            None => Err(VaultError::not_found("document", document.id)),
        }
    }

    async fn delete_document(&self, id: DocumentId) -> VaultResult<()> {
        self.state
            .write()
            .await
            .documents
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| VaultError::not_found("document", id))
    }

    async fn list_documents(&self, workspace_id: &str) -> VaultResult<Vec<Document>> {
        Ok(self.state.read().await.workspace_documents(workspace_id))
    }

    async fn insert_chunks(&self, chunks: Vec<DocumentChunk>) -> VaultResult<()> {
        self.state.write().await.insert_chunks(chunks)
    }

    async fn delete_chunks(&self, document_id: DocumentId) -> VaultResult<usize> {
        Ok(self.state.write().await.delete_chunks(document_id))
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
