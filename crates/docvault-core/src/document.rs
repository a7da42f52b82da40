//! Document and chunk records.

use crate::encryption::EncryptionEnvelope;
use crate::error::VaultError;
use crate::key_derivation::TenantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Document identifier.
pub type DocumentId = Uuid;
/// Chunk identifier.
pub type ChunkId = Uuid;
/// Free-form per-chunk provenance.
pub type ChunkMetadata = serde_json::Map<String, serde_json::Value>;

/// BLAKE3 hex digest of a plaintext file, recorded at upload and checked before parsing.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Closed set of accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Free text extracted from a PDF
    Pdf,
    /// Comma separated rows
    Csv,
    /// Spreadsheet workbook
    Excel,
}

impl DocumentType {
    /// Lowercase name, as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Csv => "csv",
            DocumentType::Excel => "excel",
        }
    }

    /// MIME type recorded on upload.
    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "application/pdf",
            DocumentType::Csv => "text/csv",
            DocumentType::Excel => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    /// Tabular types are chunked by rows.
    pub fn is_tabular(&self) -> bool {
        matches!(self, DocumentType::Csv | DocumentType::Excel)
    }

    /// Guess the type from a file name extension.
    pub fn from_file_name(name: &str) -> Result<Self, VaultError> {
        let ext = std::path::Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match ext.to_lowercase().as_str() {
            "pdf" => Ok(DocumentType::Pdf),
            "csv" => Ok(DocumentType::Csv),
            "xls" | "xlsx" => Ok(DocumentType::Excel),
            _ => Err(VaultError::UnsupportedFormat(format!(
                "cannot infer document type from {:?}",
                name
            ))),
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(DocumentType::Pdf),
            "csv" => Ok(DocumentType::Csv),
            "excel" | "xlsx" | "xls" => Ok(DocumentType::Excel),
            other => Err(VaultError::UnsupportedFormat(format!(
                "unknown document type {:?}",
                other
            ))),
        }
    }
}

/// Envelope of the whole-file blob; the ciphertext itself lives in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobEnvelope {
    /// Base64 IV
    pub iv: String,
    /// Base64 authentication tag
    pub auth_tag: String,
    /// Key derivation epoch used for this blob
    pub key_id: String,
}

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id
    pub id: DocumentId,
    /// Owning tenant, never inferred from content
    pub tenant_id: TenantId,
    /// Workspace the document belongs to
    pub workspace_id: String,
    /// Original file name
    pub name: String,
    /// Declared format
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    /// Object store locator of the encrypted file
    pub blob_locator: String,
    /// Plaintext size in bytes
    pub file_size: u64,
    /// MIME type
    pub mime_type: String,
    /// IV, tag and key id of the encrypted file
    pub encryption: BlobEnvelope,
    /// BLAKE3 hex digest of the plaintext
    pub content_hash: String,
    /// Upload time
    pub created_at: DateTime<Utc>,
    /// Set only once every chunk has been persisted
    pub processed_at: Option<DateTime<Utc>>,
    /// Reason of the last failed processing attempt
    pub last_error: Option<String>,
}

impl Document {
    /// True once processing completed.
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    /// Lifecycle state; `in_flight` comes from the processing guard.
    pub fn state(&self, in_flight: bool) -> ProcessingState {
        if in_flight {
            ProcessingState::Processing
        } else if self.processed_at.is_some() {
            ProcessingState::Processed
        } else if self.last_error.is_some() {
            ProcessingState::Unprocessed
        } else {
            ProcessingState::Uploaded
        }
    }
}

/// Lifecycle of a document with respect to chunk processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    /// Stored, processing not yet attempted
    Uploaded,
    /// A pipeline run holds the document
    Processing,
    /// All chunks persisted
    Processed,
    /// Last attempt failed; needs an explicit reprocess
    Unprocessed,
}

/// One encrypted unit of extracted content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Chunk id
    pub id: ChunkId,
    /// Owning document
    pub document_id: DocumentId,
    /// 0-based, contiguous position within the document
    pub chunk_index: u32,
    /// Encrypted content, stored as a single field
    pub content: EncryptionEnvelope,
    /// Provenance (offsets, row ranges, sheet names)
    pub metadata: ChunkMetadata,
}
