//! Fixed-window chunking: a `chunk_size` character window advanced by
//! `chunk_size - overlap`. Cuts anywhere, including mid-word.

use crate::chunking::{ChunkRecord, ChunkSink, ChunkStrategy};
use crate::error::{VaultError, VaultResult};
use serde_json::json;

/// Sliding character window chunker.
#[derive(Debug, Clone, Copy)]
pub struct FixedWindowChunker {
    chunk_size: usize,
    overlap: usize,
}

impl FixedWindowChunker {
    /// Create a chunker. `overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> VaultResult<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(VaultError::Configuration(format!(
                "invalid window: chunk_size={} overlap={}",
                chunk_size, overlap
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    /// Distance between consecutive window starts.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Produce one record per window start below the text length.
    /// Whitespace-only windows are skipped before indices are assigned.
    pub fn chunk(&self, text: &str) -> Vec<ChunkRecord> {
        let mut sink = ChunkSink::default();
        if text.trim().is_empty() {
            return sink.finish();
        }

        let chars: Vec<char> = text.chars().collect();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            if !window.trim().is_empty() {
                sink.push(
                    window,
                    json!({
                        "strategy": ChunkStrategy::FixedWindow.as_str(),
                        "start_char": start,
                        "end_char": end,
                    }),
                );
            }
            start += self.step();
        }
        sink.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn starts(records: &[ChunkRecord]) -> Vec<u64> {
        records
            .iter()
            .map(|r| r.metadata["start_char"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn twenty_five_hundred_chars_make_four_chunks() {
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let records = FixedWindowChunker::new(1000, 200).unwrap().chunk(&text);
        assert_eq!(records.len(), 4);
        assert_eq!(starts(&records), vec![0, 800, 1600, 2400]);
        assert_eq!(records[0].content.chars().count(), 1000);
        assert_eq!(records[3].content.chars().count(), 100);
        assert_eq!(&records[1].content[..200], &records[0].content[800..]);
    }

    #[test]
    fn short_text_is_single_chunk() {
        let records = FixedWindowChunker::new(1000, 200).unwrap().chunk("hello world");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "hello world");
        assert_eq!(records[0].metadata["end_char"], 11);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(10);
        let records = FixedWindowChunker::new(4, 1).unwrap().chunk(&text);
        assert_eq!(starts(&records), vec![0, 3, 6, 9]);
        assert!(records.iter().all(|r| r.content.chars().all(|c| c == 'é')));
    }

    #[test]
    fn whitespace_windows_are_skipped() {
        let text = format!("abc{}xyz", " ".repeat(20));
        let records = FixedWindowChunker::new(5, 0).unwrap().chunk(&text);
        let indices: Vec<u32> = records.iter().map(|r| r.index).collect();
        assert_eq!(indices, (0..records.len() as u32).collect::<Vec<_>>());
        assert!(records.iter().all(|r| !r.content.trim().is_empty()));
    }

    #[test]
    fn blank_text_has_no_chunks() {
        let chunker = FixedWindowChunker::new(10, 2).unwrap();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n ").is_empty());
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert!(FixedWindowChunker::new(0, 0).is_err());
        assert!(FixedWindowChunker::new(100, 100).is_err());
        assert!(FixedWindowChunker::new(100, 150).is_err());
    }

    proptest! {
        #[test]
        fn prop_windows_cover_text_in_order(
            text in "[a-z]{1,600}",
            size in 1usize..120,
            overlap_pct in 0usize..100,
        ) {
            let overlap = size * overlap_pct / 100;
            let chunker = FixedWindowChunker::new(size, overlap).unwrap();
            let records = chunker.chunk(&text);
            let len = text.chars().count();
            prop_assert_eq!(records.len(), (len + chunker.step() - 1) / chunker.step());
            for (i, r) in records.iter().enumerate() {
                prop_assert_eq!(r.index as usize, i);
                let start = r.metadata["start_char"].as_u64().unwrap() as usize;
                prop_assert_eq!(start, i * chunker.step());
                let expected: String = text.chars().skip(start).take(size).collect();
                prop_assert_eq!(&r.content, &expected);
            }
        }
    }
}
