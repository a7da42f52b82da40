//! Error types for the docvault core

use uuid::Uuid;

/// Result type alias for docvault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// All errors that can occur while storing, encrypting or processing documents
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Missing master secret or an invalid configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Authentication tag mismatch or malformed envelope: wrong tenant, corruption or tampering
    #[error("Integrity check failed: authentication tag mismatch")]
    Integrity,
    /// Document type or parsed content shape the pipeline cannot handle
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    /// A processing attempt failed; the document was left unprocessed
    #[error("Processing failed for document {document_id}: {source}")]
    Processing {
        /// Document whose processing attempt failed
        document_id: Uuid,
        /// Underlying parser, chunking, encryption or persistence failure
        #[source]
        source: Box<VaultError>,
    },
    /// Referenced document, chunk or blob does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of entity was looked up
        kind: &'static str,
        /// Identifier or locator that did not resolve
        id: String,
    },
    /// External parser rejected the file bytes
    #[error("Parse failed: {0}")]
    Parse(String),
    /// Chunking parameters or input could not be segmented
    #[error("Chunking failed: {0}")]
    Chunking(String),
    /// Cipher could not be constructed or sealing failed
    #[error("Encryption failed: {0}")]
    Encryption(String),
    /// Repository or object store failure
    #[error("Storage error: {0}")]
    Storage(String),
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VaultError {
    /// Shorthand for a [`VaultError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        VaultError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Wraps a pipeline failure for the given document.
    pub fn processing(document_id: Uuid, source: VaultError) -> Self {
        VaultError::Processing {
            document_id,
            source: Box::new(source),
        }
    }

    /// True for integrity failures, including ones wrapped by a processing error.
    pub fn is_integrity(&self) -> bool {
        match self {
            VaultError::Integrity => true,
            VaultError::Processing { source, .. } => source.is_integrity(),
            _ => false,
        }
    }

    /// True if the error reports a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound { .. })
    }
}
