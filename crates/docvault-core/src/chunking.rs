//! Chunking engine: turns parsed content into ordered chunk records.
//!
//! Three strategies are available. Text goes through the sentence-aware chunker
//! unless it has no sentence boundary to cut at, in which case the fixed window
//! is used. Rows are grouped by the structured-row chunker.

use crate::document::ChunkMetadata;
use crate::error::{VaultError, VaultResult};
use crate::parser::ParsedContent;
use crate::row_chunker::RowChunker;
use crate::sentence_chunker::{split_sentences, SentenceChunker};
use crate::window_chunker::FixedWindowChunker;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default window / target chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap in characters.
pub const DEFAULT_OVERLAP: usize = 200;
/// Default rows grouped into one chunk.
pub const DEFAULT_ROWS_PER_CHUNK: usize = 50;

/// Chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive text chunks in characters
    pub overlap: usize,
    /// Rows per structured chunk
    pub rows_per_chunk: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            rows_per_chunk: DEFAULT_ROWS_PER_CHUNK,
        }
    }
}

impl ChunkingConfig {
    /// Reject parameters that cannot make forward progress.
    pub fn validate(&self) -> VaultResult<()> {
        if self.chunk_size == 0 {
            return Err(VaultError::Configuration(
                "chunking.chunk_size must be greater than zero".into(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(VaultError::Configuration(format!(
                "chunking.overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        if self.rows_per_chunk == 0 {
            return Err(VaultError::Configuration(
                "chunking.rows_per_chunk must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Segmentation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Sliding character window
    FixedWindow,
    /// Whole sentences with sentence overlap
    SentenceAware,
    /// Groups of consecutive rows
    StructuredRow,
}

impl ChunkStrategy {
    /// Name recorded in chunk metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStrategy::FixedWindow => "fixed_window",
            ChunkStrategy::SentenceAware => "sentence_aware",
            ChunkStrategy::StructuredRow => "structured_row",
        }
    }
}

impl std::fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plaintext chunk, before encryption.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// Position in the produced sequence
    pub index: u32,
    /// Plaintext content
    pub content: String,
    /// Provenance
    pub metadata: ChunkMetadata,
}

/// Collects records and assigns contiguous indices in production order.
#[derive(Debug, Default)]
pub(crate) struct ChunkSink {
    records: Vec<ChunkRecord>,
}

impl ChunkSink {
    pub(crate) fn push(&mut self, content: String, metadata: serde_json::Value) {
        let metadata = match metadata {
            serde_json::Value::Object(map) => map,
            _ => ChunkMetadata::new(),
        };
        self.records.push(ChunkRecord {
            index: self.records.len() as u32,
            content,
            metadata,
        });
    }

    pub(crate) fn finish(self) -> Vec<ChunkRecord> {
        self.records
    }
}

/// Strategy selection plus dispatch.
#[derive(Debug, Clone)]
pub struct ChunkingEngine {
    config: ChunkingConfig,
}

impl ChunkingEngine {
    /// Create an engine; fails on degenerate parameters.
    pub fn new(config: ChunkingConfig) -> VaultResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active parameters.
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Pick a strategy from the content shape.
    pub fn select_strategy(&self, content: &ParsedContent) -> ChunkStrategy {
        match content {
            ParsedContent::Rows(_) => ChunkStrategy::StructuredRow,
            ParsedContent::Text(text) => {
                let unsplittable = split_sentences(text).len() <= 1
                    && text.chars().count() > self.config.chunk_size;
                if unsplittable {
                    ChunkStrategy::FixedWindow
                } else {
                    ChunkStrategy::SentenceAware
                }
            }
        }
    }

    /// Chunk with the selected strategy.
    pub fn chunk(&self, content: &ParsedContent) -> VaultResult<(ChunkStrategy, Vec<ChunkRecord>)> {
        let strategy = self.select_strategy(content);
        let records = self.chunk_with(strategy, content)?;
        debug!(
            strategy = %strategy,
            shape = content.shape(),
            chunks = records.len(),
            "content chunked"
        );
        Ok((strategy, records))
    }

    /// Chunk with an explicit strategy.
    pub fn chunk_with(
        &self,
        strategy: ChunkStrategy,
        content: &ParsedContent,
    ) -> VaultResult<Vec<ChunkRecord>> {
        match (strategy, content) {
            (ChunkStrategy::FixedWindow, ParsedContent::Text(text)) => {
                let chunker = FixedWindowChunker::new(self.config.chunk_size, self.config.overlap)?;
                Ok(chunker.chunk(text))
            }
            (ChunkStrategy::SentenceAware, ParsedContent::Text(text)) => {
                let chunker = SentenceChunker::new(self.config.chunk_size, self.config.overlap)?;
                Ok(chunker.chunk(text))
            }
            (ChunkStrategy::StructuredRow, ParsedContent::Rows(rows)) => {
                RowChunker::new(self.config.rows_per_chunk)?.chunk(rows)
            }
            (strategy, content) => Err(VaultError::Chunking(format!(
                "{} cannot chunk {} content",
                strategy,
                content.shape()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::RowRecord;
    use serde_json::json;

    fn engine() -> ChunkingEngine {
        ChunkingEngine::new(ChunkingConfig::default()).unwrap()
    }

    #[test]
    fn config_validation() {
        assert!(ChunkingConfig::default().validate().is_ok());
        let bad = [
            ChunkingConfig {
                chunk_size: 0,
                overlap: 0,
                rows_per_chunk: 1,
            },
            ChunkingConfig {
                chunk_size: 10,
                overlap: 10,
                rows_per_chunk: 1,
            },
            ChunkingConfig {
                chunk_size: 10,
                overlap: 2,
                rows_per_chunk: 0,
            },
        ];
        for config in bad {
            assert!(matches!(
                ChunkingEngine::new(config),
                Err(VaultError::Configuration(_))
            ));
        }
    }

    #[test]
    fn prose_uses_sentence_strategy() {
        let content = ParsedContent::Text("One. Two! Three?".into());
        assert_eq!(engine().select_strategy(&content), ChunkStrategy::SentenceAware);
    }

    #[test]
    fn unsplittable_text_falls_back_to_window() {
        let content = ParsedContent::Text("x".repeat(2500));
        let (strategy, records) = engine().chunk(&content).unwrap();
        assert_eq!(strategy, ChunkStrategy::FixedWindow);
        assert_eq!(records.len(), 4);
    }

    #[test]
    fn short_text_without_terminator_stays_sentence_aware() {
        let content = ParsedContent::Text("just a heading".into());
        let (strategy, records) = engine().chunk(&content).unwrap();
        assert_eq!(strategy, ChunkStrategy::SentenceAware);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "just a heading");
    }

    #[test]
    fn rows_use_structured_strategy() {
        let rows = vec![RowRecord::new(json!({"a": 1}).as_object().cloned().unwrap())];
        let (strategy, records) = engine().chunk(&ParsedContent::Rows(rows)).unwrap();
        assert_eq!(strategy, ChunkStrategy::StructuredRow);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn mismatched_strategy_is_rejected() {
        let result =
            engine().chunk_with(ChunkStrategy::StructuredRow, &ParsedContent::Text("a".into()));
        assert!(matches!(result, Err(VaultError::Chunking(_))));
    }

    #[test]
    fn blank_input_yields_no_chunks() {
        for content in [
            ParsedContent::Text(String::new()),
            ParsedContent::Text(" \n\t ".into()),
            ParsedContent::Rows(Vec::new()),
        ] {
            let (_, records) = engine().chunk(&content).unwrap();
            assert!(records.is_empty());
        }
    }

    #[test]
    fn sink_assigns_contiguous_indices() {
        let mut sink = ChunkSink::default();
        for i in 0..5 {
            sink.push(format!("c{}", i), json!({ "n": i }));
        }
        let records = sink.finish();
        let indices: Vec<u32> = records.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(records[3].metadata["n"], json!(3));
    }
}
