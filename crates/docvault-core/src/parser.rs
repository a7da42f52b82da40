//! Parser seam: format decoding lives outside the core.

use crate::document::DocumentType;
use crate::error::{VaultError, VaultResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered cell map of one row.
pub type RowCells = serde_json::Map<String, serde_json::Value>;

/// One record produced by a tabular parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    /// Source sheet for workbook formats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// Column name to value
    pub cells: RowCells,
}

impl RowRecord {
    /// A row without sheet provenance.
    pub fn new(cells: RowCells) -> Self {
        Self {
            sheet: None,
            cells,
        }
    }

    /// A row from a named sheet.
    pub fn in_sheet(sheet: impl Into<String>, cells: RowCells) -> Self {
        Self {
            sheet: Some(sheet.into()),
            cells,
        }
    }
}

/// Output of an external parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedContent {
    /// Extracted free text
    Text(String),
    /// Tabular records in source order
    Rows(Vec<RowRecord>),
}

impl ParsedContent {
    /// Shape name, for logs and chunk metadata.
    pub fn shape(&self) -> &'static str {
        match self {
            ParsedContent::Text(_) => "text",
            ParsedContent::Rows(_) => "rows",
        }
    }
}

/// A format-specific parser.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Decode raw file bytes.
    async fn parse(&self, bytes: &[u8]) -> VaultResult<ParsedContent>;
}

/// Treats the file as already-extracted UTF-8 text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextParser;

#[async_trait]
impl DocumentParser for PlainTextParser {
    async fn parse(&self, bytes: &[u8]) -> VaultResult<ParsedContent> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| VaultError::Parse(format!("input is not valid UTF-8: {}", e)))?;
        Ok(ParsedContent::Text(text.to_string()))
    }
}

/// Parsers keyed by document type.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<DocumentType, Arc<dyn DocumentParser>>,
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.parsers.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("ParserRegistry").field("types", &types).finish()
    }
}

impl ParserRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the parser for a type.
    pub fn with_parser(mut self, doc_type: DocumentType, parser: Arc<dyn DocumentParser>) -> Self {
        self.parsers.insert(doc_type, parser);
        self
    }

    /// True if a parser is registered for the type.
    pub fn supports(&self, doc_type: DocumentType) -> bool {
        self.parsers.contains_key(&doc_type)
    }

    /// Parse `bytes` with the parser registered for `doc_type`.
    pub async fn parse(&self, doc_type: DocumentType, bytes: &[u8]) -> VaultResult<ParsedContent> {
        let parser = self.parsers.get(&doc_type).ok_or_else(|| {
            VaultError::UnsupportedFormat(format!("no parser registered for {}", doc_type))
        })?;
        parser.parse(bytes).await
    }
}
