//! Processing pipeline: blob → parse → chunk → encrypt → batched persist.
//!
//! A run holds the document's processing permit for its whole duration.
//! `processed_at` is cleared before any chunk is touched and set only after
//! the last batch landed. A failed run removes every chunk of the document
//! again, so readers see either the complete chunk set or none of it.

use crate::blob::BlobAdapter;
use crate::chunking::{ChunkRecord, ChunkStrategy, ChunkingEngine};
use crate::document::{content_hash, Document, DocumentChunk, DocumentId, DocumentType};
use crate::encryption::{EncryptionCodec, TenantCipher};
use crate::error::{VaultError, VaultResult};
use crate::metrics::PipelineMetrics;
use crate::parser::{ParsedContent, ParserRegistry};
use crate::processing_guard::{ProcessingGuard, ProcessingPermit};
use crate::repository::DocumentRepository;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

/// Default number of chunk records persisted per repository call.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Where processing runs relative to the upload call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// The upload call awaits processing
    Inline,
    /// Processing runs on a background task
    #[default]
    Detached,
}

/// Pipeline parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Chunk records per batch insert
    pub batch_size: usize,
    /// Inline or detached processing after upload
    pub processing_mode: ProcessingMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            processing_mode: ProcessingMode::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject a zero batch size.
    pub fn validate(&self) -> VaultResult<()> {
        if self.batch_size == 0 {
            return Err(VaultError::Configuration(
                "pipeline.batch_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingReport {
    /// Processed document
    pub document_id: DocumentId,
    /// Chunks persisted by this run
    pub chunks_processed: usize,
    /// Batch inserts issued
    pub batches_written: usize,
    /// Chunks of a previous run removed first
    pub chunks_removed: usize,
    /// Strategy used to segment the content
    pub strategy: ChunkStrategy,
}

/// Orchestrates processing runs. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ProcessingPipeline {
    repository: Arc<dyn DocumentRepository>,
    blobs: BlobAdapter,
    codec: EncryptionCodec,
    parsers: ParserRegistry,
    chunking: ChunkingEngine,
    config: PipelineConfig,
    guard: ProcessingGuard,
    metrics: Arc<PipelineMetrics>,
}

impl std::fmt::Debug for ProcessingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingPipeline")
            .field("parsers", &self.parsers)
            .field("chunking", self.chunking.config())
            .field("config", &self.config)
            .field("in_flight", &self.guard.in_flight())
            .finish()
    }
}

impl ProcessingPipeline {
    /// Assemble a pipeline; fails on an invalid batch size.
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        blobs: BlobAdapter,
        codec: EncryptionCodec,
        parsers: ParserRegistry,
        chunking: ChunkingEngine,
        config: PipelineConfig,
    ) -> VaultResult<Self> {
        config.validate()?;
        Ok(Self {
            repository,
            blobs,
            codec,
            parsers,
            chunking,
            config,
            guard: ProcessingGuard::new(),
            metrics: Arc::new(PipelineMetrics::new()),
        })
    }

    /// Share a metrics registry with other components.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Pipeline parameters.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Metrics registry.
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// True while a run holds or waits on the document.
    pub fn is_in_flight(&self, document_id: DocumentId) -> bool {
        self.guard.is_in_flight(document_id)
    }

    /// Wait for any run on the document to finish and keep new runs out
    /// until the permit is dropped.
    pub async fn lock_document(&self, document_id: DocumentId) -> ProcessingPermit {
        self.guard.acquire(document_id).await
    }

    /// Process a freshly uploaded document.
    #[instrument(skip(self))]
    pub async fn process(&self, document_id: DocumentId) -> VaultResult<ProcessingReport> {
        self.run(document_id).await
    }

    /// Delete every chunk of the document and regenerate them from the blob.
    #[instrument(skip(self))]
    pub async fn reprocess(&self, document_id: DocumentId) -> VaultResult<ProcessingReport> {
        info!("reprocessing requested");
        self.run(document_id).await
    }

    /// Run [`process`](Self::process) on a detached task. The outcome is only logged.
    pub fn spawn(&self, document_id: DocumentId) -> JoinHandle<()> {
        let pipeline = self.clone();
        let span = info_span!("detached_processing", %document_id);
        tokio::spawn(
            async move {
                if let Err(e) = pipeline.run(document_id).await {
                    debug!(error = %e, "detached run ended in failure");
                }
            }
            .instrument(span),
        )
    }

    async fn run(&self, document_id: DocumentId) -> VaultResult<ProcessingReport> {
        let _permit = self.guard.acquire(document_id).await;
        let mut document = self.repository.get_document(document_id).await?;
        self.metrics.record_run_started();

        match self.attempt(&mut document).await {
            Ok(report) => {
                self.metrics.record_run_succeeded();
                info!(
                    chunks = report.chunks_processed,
                    batches = report.batches_written,
                    strategy = %report.strategy,
                    "document processed"
                );
                Ok(report)
            }
            Err(cause) => Err(self.fail(&mut document, cause).await),
        }
    }

    async fn attempt(&self, document: &mut Document) -> VaultResult<ProcessingReport> {
        document.processed_at = None;
        document.last_error = None;
        self.repository.update_document(document.clone()).await?;

        let chunks_removed = self.repository.delete_chunks(document.id).await?;
        if chunks_removed > 0 {
            debug!(removed = chunks_removed, "previous chunks deleted");
        }

        let bytes = self
            .blobs
            .download_and_decrypt(
                &document.blob_locator,
                &document.encryption.iv,
                &document.encryption.auth_tag,
                &document.tenant_id,
            )
            .await?;
        if content_hash(&bytes) != document.content_hash {
            return Err(VaultError::Integrity);
        }

        let parsed = self.parsers.parse(document.doc_type, &bytes).await?;
        let strategy = self.strategy_for(document.doc_type, &parsed)?;
        let records = self.chunking.chunk_with(strategy, &parsed)?;
        let total = records.len();
        debug!(%strategy, chunks = total, "content chunked");

        let cipher = self.codec.derive_cipher(&document.tenant_id).await?;
        let mut pending = records.into_iter().peekable();
        let mut batches_written = 0;
        while pending.peek().is_some() {
            let batch = pending
                .by_ref()
                .take(self.config.batch_size)
                .map(|record| seal_chunk(&cipher, document.id, record))
                .collect::<VaultResult<Vec<_>>>()?;
            let len = batch.len();
            self.repository.insert_chunks(batch).await?;
            batches_written += 1;
            self.metrics.record_batch(len as u64);
            debug!(batch = batches_written, chunks = len, "batch persisted");
        }

        document.processed_at = Some(Utc::now());
        self.repository.update_document(document.clone()).await?;

        Ok(ProcessingReport {
            document_id: document.id,
            chunks_processed: total,
            batches_written,
            chunks_removed,
            strategy,
        })
    }

    /// Tabular types are chunked by rows; text types by sentences, or by
    /// fixed window when the text cannot be split into sentences.
    fn strategy_for(
        &self,
        doc_type: DocumentType,
        content: &ParsedContent,
    ) -> VaultResult<ChunkStrategy> {
        match (doc_type.is_tabular(), content) {
            (true, ParsedContent::Rows(_)) => Ok(ChunkStrategy::StructuredRow),
            (false, ParsedContent::Text(_)) => Ok(self.chunking.select_strategy(content)),
            (_, content) => Err(VaultError::UnsupportedFormat(format!(
                "{} parser produced {} content",
                doc_type,
                content.shape()
            ))),
        }
    }

    /// Roll back to zero chunks, record the cause and wrap it.
    async fn fail(&self, document: &mut Document, cause: VaultError) -> VaultError {
        if cause.is_integrity() {
            self.metrics.record_integrity_failure();
        }
        match self.repository.delete_chunks(document.id).await {
            Ok(0) => {}
            Ok(removed) => warn!(removed, "partial chunk set removed"),
            Err(e) => error!(error = %e, "could not remove partial chunk set"),
        }

        document.processed_at = None;
        document.last_error = Some(cause.to_string());
        if let Err(e) = self.repository.update_document(document.clone()).await {
            warn!(error = %e, "could not record processing failure on document");
        }

        self.metrics.record_run_failed();
        let err = VaultError::processing(document.id, cause);
        error!(error = %err, "processing failed, document left unprocessed");
        err
    }
}

fn seal_chunk(
    cipher: &TenantCipher,
    document_id: DocumentId,
    record: ChunkRecord,
) -> VaultResult<DocumentChunk> {
    Ok(DocumentChunk {
        id: Uuid::new_v4(),
        document_id,
        chunk_index: record.index,
        content: cipher.encrypt(record.content.as_bytes())?,
        metadata: record.metadata,
    })
}
