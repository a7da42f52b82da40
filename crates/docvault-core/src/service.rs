//! Document service: the operations exposed to the request layer.

use crate::blob::BlobAdapter;
use crate::chunking::ChunkingEngine;
use crate::config::VaultConfig;
use crate::document::{
    content_hash, ChunkId, ChunkMetadata, Document, DocumentId, DocumentType, ProcessingState,
};
use crate::encryption::EncryptionCodec;
use crate::error::{VaultError, VaultResult};
use crate::key_derivation::TenantId;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::object_store::ObjectStore;
use crate::parser::ParserRegistry;
use crate::pipeline::{ProcessingMode, ProcessingPipeline, ProcessingReport};
use crate::repository::DocumentRepository;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A decrypted chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainChunk {
    /// Chunk id
    pub id: ChunkId,
    /// Position within the document
    pub chunk_index: u32,
    /// Plaintext content
    pub content: String,
    /// Provenance
    pub metadata: ChunkMetadata,
}

/// What a delete removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    /// Whether the encrypted blob was removed from the object store
    pub blob_deleted: bool,
    /// Chunk records removed
    pub chunks_deleted: usize,
}

/// Upload, processing, retrieval and deletion of tenant documents.
pub struct DocumentService {
    repository: Arc<dyn DocumentRepository>,
    blobs: BlobAdapter,
    codec: EncryptionCodec,
    pipeline: ProcessingPipeline,
    metrics: Arc<PipelineMetrics>,
    detached: DashMap<DocumentId, JoinHandle<()>>,
}

impl std::fmt::Debug for DocumentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentService")
            .field("pipeline", &self.pipeline)
            .field("detached", &self.detached.len())
            .finish()
    }
}

impl DocumentService {
    /// Wire the service from a validated configuration.
    pub fn new(
        config: &VaultConfig,
        store: Arc<dyn ObjectStore>,
        repository: Arc<dyn DocumentRepository>,
        parsers: ParserRegistry,
    ) -> VaultResult<Self> {
        config.validate()?;
        let codec = EncryptionCodec::from_config(config)?;
        Self::with_codec(config, codec, store, repository, parsers)
    }

    /// Wire the service around an existing codec (custom key derivation).
    pub fn with_codec(
        config: &VaultConfig,
        codec: EncryptionCodec,
        store: Arc<dyn ObjectStore>,
        repository: Arc<dyn DocumentRepository>,
        parsers: ParserRegistry,
    ) -> VaultResult<Self> {
        let metrics = Arc::new(PipelineMetrics::new());
        let blobs = BlobAdapter::new(store, codec.clone());
        let pipeline = ProcessingPipeline::new(
            Arc::clone(&repository),
            blobs.clone(),
            codec.clone(),
            parsers,
            ChunkingEngine::new(config.chunking.clone())?,
            config.pipeline.clone(),
        )?
        .with_metrics(Arc::clone(&metrics));
        Ok(Self {
            repository,
            blobs,
            codec,
            pipeline,
            metrics,
            detached: DashMap::new(),
        })
    }

    /// The processing pipeline.
    pub fn pipeline(&self) -> &ProcessingPipeline {
        &self.pipeline
    }

    /// Encrypt and store a file, create its document and schedule processing.
    ///
    /// Succeeds once the document record exists, whatever the outcome of
    /// processing. With inline processing the returned record already
    /// carries `processed_at` or `last_error`.
    #[instrument(
        skip_all,
        fields(
            bytes = file.len(),
            tenant = %tenant,
            workspace = workspace_id,
            doc_type = %doc_type
        )
    )]
    pub async fn upload_document(
        &self,
        file: &[u8],
        tenant: &TenantId,
        workspace_id: &str,
        doc_type: DocumentType,
        name: &str,
    ) -> VaultResult<Document> {
        let id = Uuid::new_v4();
        let locator = BlobAdapter::locator_for(tenant, workspace_id, id);
        let upload = self.blobs.upload_encrypted(file, &locator, tenant).await?;

        let document = Document {
            id,
            tenant_id: tenant.clone(),
            workspace_id: workspace_id.to_string(),
            name: name.to_string(),
            doc_type,
            blob_locator: upload.locator.clone(),
            file_size: file.len() as u64,
            mime_type: doc_type.mime_type().to_string(),
            encryption: upload.envelope(),
            content_hash: content_hash(file),
            created_at: Utc::now(),
            processed_at: None,
            last_error: None,
        };
        if let Err(e) = self.repository.create_document(document.clone()).await {
            self.blobs.delete(&upload.locator).await;
            return Err(e);
        }
        self.metrics.record_upload(document.file_size);
        info!(document_id = %id, "document uploaded");

        match self.pipeline.config().processing_mode {
            ProcessingMode::Inline => {
                // Failure is already recorded on the document.
                let _ = self.pipeline.process(id).await;
                self.repository.get_document(id).await
            }
            ProcessingMode::Detached => {
                self.detached.retain(|_, handle| !handle.is_finished());
                self.detached.insert(id, self.pipeline.spawn(id));
                Ok(document)
            }
        }
    }

    /// Wait for a detached run started by upload, then return the document.
    pub async fn wait_for_processing(&self, document_id: DocumentId) -> VaultResult<Document> {
        if let Some((_, handle)) = self.detached.remove(&document_id) {
            handle
                .await
                .map_err(|e| VaultError::Storage(format!("processing task aborted: {}", e)))?;
        }
        self.repository.get_document(document_id).await
    }

    /// Delete and regenerate every chunk of a document.
    pub async fn reprocess_document(
        &self,
        document_id: DocumentId,
    ) -> VaultResult<ProcessingReport> {
        self.pipeline.reprocess(document_id).await
    }

    /// Decrypt one chunk. A chunk of another tenant's document is reported
    /// as not found, before any decryption.
    #[instrument(skip(self, tenant), fields(tenant = %tenant))]
    pub async fn retrieve_document_chunk(
        &self,
        chunk_id: ChunkId,
        tenant: &TenantId,
    ) -> VaultResult<Vec<u8>> {
        let chunk = self.repository.get_chunk(chunk_id).await?;
        let document = self.repository.get_document(chunk.document_id).await?;
        if &document.tenant_id != tenant {
            return Err(VaultError::not_found("chunk", chunk_id));
        }
        let cipher = self.codec.derive_cipher(tenant).await?;
        let plaintext = self.observe(cipher.decrypt(&chunk.content))?;
        self.metrics.record_chunk_retrieved();
        Ok(plaintext)
    }

    /// Decrypt every chunk of a document in index order.
    pub async fn list_chunks(
        &self,
        document_id: DocumentId,
        tenant: &TenantId,
    ) -> VaultResult<Vec<PlainChunk>> {
        self.owned_document(document_id, tenant).await?;
        let chunks = self.repository.list_chunks(document_id).await?;
        let cipher = self.codec.derive_cipher(tenant).await?;
        let mut out = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let plaintext = self.observe(cipher.decrypt(&chunk.content))?;
            let content = String::from_utf8(plaintext)
                .map_err(|e| VaultError::Parse(format!("chunk {} is not UTF-8: {}", chunk.id, e)))?;
            self.metrics.record_chunk_retrieved();
            out.push(PlainChunk {
                id: chunk.id,
                chunk_index: chunk.chunk_index,
                content,
                metadata: chunk.metadata,
            });
        }
        Ok(out)
    }

    /// Decrypt the whole original file.
    pub async fn download_document(
        &self,
        document_id: DocumentId,
        tenant: &TenantId,
    ) -> VaultResult<Vec<u8>> {
        let document = self.owned_document(document_id, tenant).await?;
        let result = self
            .blobs
            .download_and_decrypt(
                &document.blob_locator,
                &document.encryption.iv,
                &document.encryption.auth_tag,
                tenant,
            )
            .await;
        self.observe(result)
    }

    /// Delete the blob (best effort), then the chunks, then the document.
    /// Waits for an in-flight processing run of the document first.
    #[instrument(skip(self))]
    pub async fn delete_document(&self, document_id: DocumentId) -> VaultResult<DeleteReport> {
        let _permit = self.pipeline.lock_document(document_id).await;
        let document = self.repository.get_document(document_id).await?;

        let blob_deleted = self.blobs.delete(&document.blob_locator).await;
        let chunks_deleted = self.repository.delete_chunks(document_id).await?;
        self.repository.delete_document(document_id).await?;
        self.detached.remove(&document_id);
        self.metrics.record_delete();
        if !blob_deleted {
            warn!(locator = %document.blob_locator, "document deleted, blob left behind");
        }
        info!(chunks_deleted, "document deleted");
        Ok(DeleteReport {
            blob_deleted,
            chunks_deleted,
        })
    }

    /// Fetch a document record.
    pub async fn get_document(&self, document_id: DocumentId) -> VaultResult<Document> {
        self.repository.get_document(document_id).await
    }

    /// Documents of a workspace, oldest first.
    pub async fn list_documents(&self, workspace_id: &str) -> VaultResult<Vec<Document>> {
        self.repository.list_documents(workspace_id).await
    }

    /// Current lifecycle state of a document.
    pub async fn document_state(&self, document_id: DocumentId) -> VaultResult<ProcessingState> {
        let document = self.repository.get_document(document_id).await?;
        Ok(document.state(self.pipeline.is_in_flight(document_id)))
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn owned_document(
        &self,
        document_id: DocumentId,
        tenant: &TenantId,
    ) -> VaultResult<Document> {
        let document = self.repository.get_document(document_id).await?;
        if &document.tenant_id != tenant {
            return Err(VaultError::not_found("document", document_id));
        }
        Ok(document)
    }

    fn observe<T>(&self, result: VaultResult<T>) -> VaultResult<T> {
        if matches!(&result, Err(e) if e.is_integrity()) {
            self.metrics.record_integrity_failure();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryObjectStore;
    use crate::parser::PlainTextParser;
    use crate::pipeline::ProcessingMode;
    use crate::repository::MemoryRepository;

    fn service(mode: ProcessingMode) -> DocumentService {
        let mut config = VaultConfig::default().with_master_secret("service-test");
        config.kdf.iterations = 64;
        config.pipeline.processing_mode = mode;
        let parsers =
            ParserRegistry::new().with_parser(DocumentType::Pdf, Arc::new(PlainTextParser));
        DocumentService::new(
            &config,
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryRepository::new()),
            parsers,
        )
        .unwrap()
    }

    #[test]
    fn requires_master_secret() {
        let err = DocumentService::new(
            &VaultConfig::default(),
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryRepository::new()),
            ParserRegistry::new(),
        )
        .unwrap_err();
        assert!(matches!(err, VaultError::Configuration(_)));
    }

    #[tokio::test]
    async fn inline_upload_returns_processed_document() {
        let svc = service(ProcessingMode::Inline);
        let tenant = TenantId::new("acme");
        let doc = svc
            .upload_document(b"Hello world. Bye now.", &tenant, "ws", DocumentType::Pdf, "a.pdf")
            .await
            .unwrap();
        assert!(doc.is_processed());
        assert_eq!(doc.mime_type, "application/pdf");
        assert_eq!(doc.file_size, 21);
        assert_eq!(svc.document_state(doc.id).await.unwrap(), ProcessingState::Processed);

        let chunks = svc.list_chunks(doc.id, &tenant).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Hello world. Bye now.");
        let plain = svc.retrieve_document_chunk(chunks[0].id, &tenant).await.unwrap();
        assert_eq!(plain, b"Hello world. Bye now.");
    }

    #[tokio::test]
    async fn failed_inline_processing_still_uploads() {
        let svc = service(ProcessingMode::Inline);
        let doc = svc
            .upload_document(b"a,b\n", &TenantId::new("acme"), "ws", DocumentType::Csv, "a.csv")
            .await
            .unwrap();
        assert!(!doc.is_processed());
        assert!(doc.last_error.is_some());
        assert_eq!(
            svc.document_state(doc.id).await.unwrap(),
            ProcessingState::Unprocessed
        );
        assert_eq!(svc.metrics().runs_failed, 1);
    }

    #[tokio::test]
    async fn detached_upload_can_be_awaited() {
        let svc = service(ProcessingMode::Detached);
        let doc = svc
            .upload_document(
                b"Later. Maybe.",
                &TenantId::new("acme"),
                "ws",
                DocumentType::Pdf,
                "b.pdf",
            )
            .await
            .unwrap();
        assert!(doc.processed_at.is_none());
        let done = svc.wait_for_processing(doc.id).await.unwrap();
        assert!(done.is_processed());
    }

    #[tokio::test]
    async fn other_tenant_sees_not_found() {
        let svc = service(ProcessingMode::Inline);
        let owner = TenantId::new("acme");
        let other = TenantId::new("globex");
        let doc = svc
            .upload_document(b"Private. Data.", &owner, "ws", DocumentType::Pdf, "p.pdf")
            .await
            .unwrap();
        let chunk = svc.list_chunks(doc.id, &owner).await.unwrap().remove(0);

        assert!(svc.retrieve_document_chunk(chunk.id, &other).await.unwrap_err().is_not_found());
        assert!(svc.download_document(doc.id, &other).await.unwrap_err().is_not_found());
        assert!(svc.list_chunks(doc.id, &other).await.unwrap_err().is_not_found());
        assert_eq!(svc.download_document(doc.id, &owner).await.unwrap(), b"Private. Data.");
    }

    #[tokio::test]
    async fn delete_cascades() {
        let svc = service(ProcessingMode::Inline);
        let tenant = TenantId::new("acme");
        let doc = svc
            .upload_document(b"One. Two.", &tenant, "ws", DocumentType::Pdf, "d.pdf")
            .await
            .unwrap();
        let report = svc.delete_document(doc.id).await.unwrap();
        assert!(report.blob_deleted);
        assert_eq!(report.chunks_deleted, 1);
        assert!(svc.get_document(doc.id).await.unwrap_err().is_not_found());
        assert!(svc.list_documents("ws").await.unwrap().is_empty());
        assert!(svc.delete_document(doc.id).await.unwrap_err().is_not_found());
    }
}
