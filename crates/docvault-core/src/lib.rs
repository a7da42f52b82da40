#![warn(missing_docs)]

//! DocVault core: tenant-isolated encryption (PBKDF2, AES-256-GCM) and chunking
//!
//! Upload path:  File → Encrypt (tenant key) → Object store → Document record
//! Process path: Blob → Decrypt → Verify hash → Parse → Chunk → Encrypt → Batch insert
//! Read path:    Chunk record → Tenant check → Decrypt

pub mod blob;
pub mod chunking;
pub mod config;
pub mod document;
pub mod encryption;
pub mod error;
pub mod key_derivation;
pub mod metrics;
pub mod object_store;
pub mod parser;
pub mod pipeline;
pub mod processing_guard;
pub mod repository;
pub mod row_chunker;
pub mod sentence_chunker;
pub mod service;
pub mod window_chunker;

pub use blob::{BlobAdapter, BlobUpload};
pub use chunking::{ChunkRecord, ChunkStrategy, ChunkingConfig, ChunkingEngine};
pub use config::{MasterSecret, StorageConfig, VaultConfig};
pub use document::{
    content_hash, BlobEnvelope, ChunkId, ChunkMetadata, Document, DocumentChunk, DocumentId,
    DocumentType, ProcessingState,
};
pub use encryption::{EncryptionCodec, EncryptionEnvelope, SealedPayload, TenantCipher};
pub use error::{VaultError, VaultResult};
pub use key_derivation::{KdfConfig, KeyDeriver, Pbkdf2KeyDeriver, TenantId, TenantKey};
pub use metrics::{MetricKind, MetricsSnapshot, PipelineMetric, PipelineMetrics};
pub use object_store::{FsObjectStore, MemoryObjectStore, MemoryObjectStoreStats, ObjectStore};
pub use parser::{
    DocumentParser, ParsedContent, ParserRegistry, PlainTextParser, RowCells, RowRecord,
};
pub use pipeline::{PipelineConfig, ProcessingMode, ProcessingPipeline, ProcessingReport};
pub use processing_guard::{ProcessingGuard, ProcessingPermit};
pub use repository::{DocumentRepository, MemoryRepository, RepositoryState};
pub use service::{DeleteReport, DocumentService, PlainChunk};
