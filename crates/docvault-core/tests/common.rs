//! Shared fixtures for the pipeline integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use docvault_core::{
    ChunkId, ChunkingConfig, Document, DocumentChunk, DocumentId, DocumentParser,
    DocumentRepository, DocumentService, DocumentType, MemoryObjectStore, MemoryRepository,
    ParsedContent, ParserRegistry, PlainTextParser, ProcessingMode, RowCells, RowRecord,
    VaultConfig, VaultError, VaultResult,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Repository that fails the N-th `insert_chunks` call (1-based).
#[derive(Default)]
pub struct FaultyRepository {
    inner: MemoryRepository,
    fail_on_batch: AtomicUsize,
    insert_calls: AtomicUsize,
}

impl FaultyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`-th insert from now on; 0 disables the fault.
    pub fn fail_on_batch(&self, n: usize) {
        self.insert_calls.store(0, Ordering::SeqCst);
        self.fail_on_batch.store(n, Ordering::SeqCst);
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub async fn chunk_count(&self) -> usize {
        self.inner.chunk_count().await
    }
}

#[async_trait]
impl DocumentRepository for FaultyRepository {
    async fn create_document(&self, document: Document) -> VaultResult<()> {
        self.inner.create_document(document).await
    }

    async fn get_document(&self, id: DocumentId) -> VaultResult<Document> {
        self.inner.get_document(id).await
    }

    async fn update_document(&self, document: Document) -> VaultResult<()> {
        self.inner.update_document(document).await
    }

    async fn delete_document(&self, id: DocumentId) -> VaultResult<()> {
        self.inner.delete_document(id).await
    }

    async fn list_documents(&self, workspace_id: &str) -> VaultResult<Vec<Document>> {
        self.inner.list_documents(workspace_id).await
    }

    async fn insert_chunks(&self, chunks: Vec<DocumentChunk>) -> VaultResult<()> {
        let call = self.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_batch.load(Ordering::SeqCst) {
            return Err(VaultError::Storage(format!("injected failure on batch {}", call)));
        }
        self.inner.insert_chunks(chunks).await
    }

    async fn delete_chunks(&self, document_id: DocumentId) -> VaultResult<usize> {
        self.inner.delete_chunks(document_id).await
    }

    async fn get_chunk(&self, id: ChunkId) -> VaultResult<DocumentChunk> {
        self.inner.get_chunk(id).await
    }

    async fn list_chunks(&self, document_id: DocumentId) -> VaultResult<Vec<DocumentChunk>> {
        self.inner.list_chunks(document_id).await
    }
}

/// One row per non-empty line: `{"line": n, "text": "..."}`.
pub struct LineRowsParser;

#[async_trait]
impl DocumentParser for LineRowsParser {
    async fn parse(&self, bytes: &[u8]) -> VaultResult<ParsedContent> {
        let text = std::str::from_utf8(bytes).map_err(|e| VaultError::Parse(e.to_string()))?;
        let rows = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                let mut cells = RowCells::new();
                cells.insert("line".into(), Value::from(i));
                cells.insert("text".into(), Value::from(line));
                RowRecord::new(cells)
            })
            .collect();
        Ok(ParsedContent::Rows(rows))
    }
}

pub fn parsers() -> ParserRegistry {
    ParserRegistry::new()
        .with_parser(DocumentType::Pdf, Arc::new(PlainTextParser))
        .with_parser(DocumentType::Csv, Arc::new(LineRowsParser))
}

pub fn test_config(mode: ProcessingMode, batch_size: usize) -> VaultConfig {
    let mut config = VaultConfig::default().with_master_secret("integration-master-secret");
    config.kdf.iterations = 64;
    config.pipeline.processing_mode = mode;
    config.pipeline.batch_size = batch_size;
    config
}

pub struct Harness {
    pub service: DocumentService,
    pub repo: Arc<FaultyRepository>,
    pub store: Arc<MemoryObjectStore>,
}

pub fn harness(config: VaultConfig) -> Harness {
    let repo = Arc::new(FaultyRepository::new());
    let store = Arc::new(MemoryObjectStore::new());
    let service = DocumentService::new(&config, store.clone(), repo.clone(), parsers())
        .expect("service wiring");
    Harness {
        service,
        repo,
        store,
    }
}

pub fn inline_harness(batch_size: usize, chunking: ChunkingConfig) -> Harness {
    let mut config = test_config(ProcessingMode::Inline, batch_size);
    config.chunking = chunking;
    harness(config)
}

/// `n` newline separated rows.
pub fn csv_lines(n: usize) -> String {
    (0..n).map(|i| format!("row {}\n", i)).collect()
}

/// Prose with `n` sentences of varying length.
pub fn prose(n: usize) -> String {
    (0..n)
        .map(|i| format!("Sentence number {} has {} words.", i, "some ".repeat(i % 7).trim_end()))
        .collect::<Vec<_>>()
        .join(" ")
}
