//! Sentence-aware chunking.
//!
//! A sentence ends at `.`, `!` or `?` followed by whitespace or end of input.
//! Sentences are packed into a chunk until the next one would push it past
//! `chunk_size`; the next chunk starts with the trailing sentences of the
//! previous one that fit in `overlap` characters. Sentences are never split.

use crate::chunking::{ChunkRecord, ChunkSink, ChunkStrategy};
use crate::error::{VaultError, VaultResult};
use serde_json::json;

/// A trimmed sentence with its character span in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    /// Trimmed sentence text, terminator included
    pub text: String,
    /// Start offset in characters
    pub start: usize,
    /// End offset in characters (exclusive)
    pub end: usize,
}

impl Sentence {
    fn len(&self) -> usize {
        self.end - self.start
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split text into trimmed, non-empty sentences.
/// Trailing text without a terminator becomes the last sentence.
pub fn split_sentences(text: &str) -> Vec<Sentence> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut seg_start = 0;

    for (i, &c) in chars.iter().enumerate() {
        let boundary = is_terminator(c)
            && chars.get(i + 1).map_or(true, |next| next.is_whitespace());
        if boundary {
            push_trimmed(&chars, seg_start, i + 1, &mut sentences);
            seg_start = i + 1;
        }
    }
    push_trimmed(&chars, seg_start, chars.len(), &mut sentences);
    sentences
}

fn push_trimmed(chars: &[char], mut start: usize, mut end: usize, out: &mut Vec<Sentence>) {
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    if start < end {
        out.push(Sentence {
            text: chars[start..end].iter().collect(),
            start,
            end,
        });
    }
}

/// Sentences of the chunk being assembled, as a range of sentence indices.
#[derive(Debug, Default)]
struct Window {
    first: usize,
    count: usize,
    carried: usize,
    chars: usize,
}

impl Window {
    fn joined_len_with(&self, sentence: &Sentence) -> usize {
        if self.count == 0 {
            sentence.len()
        } else {
            self.chars + 1 + sentence.len()
        }
    }

    fn push(&mut self, index: usize, sentence: &Sentence) {
        if self.count == 0 {
            self.first = index;
        }
        self.chars = self.joined_len_with(sentence);
        self.count += 1;
    }

    fn has_fresh(&self) -> bool {
        self.count > self.carried
    }
}

/// Packs whole sentences into chunks of at most `chunk_size` characters
/// (a single longer sentence becomes its own chunk).
#[derive(Debug, Clone, Copy)]
pub struct SentenceChunker {
    chunk_size: usize,
    overlap: usize,
}

impl SentenceChunker {
    /// Create a chunker. `overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> VaultResult<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(VaultError::Configuration(format!(
                "invalid sentence window: chunk_size={} overlap={}",
                chunk_size, overlap
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    /// Chunk `text` into sentence-aligned records.
    pub fn chunk(&self, text: &str) -> Vec<ChunkRecord> {
        let sentences = split_sentences(text);
        let mut sink = ChunkSink::default();
        let mut window = Window::default();

        for (i, sentence) in sentences.iter().enumerate() {
            if window.has_fresh() && window.joined_len_with(sentence) > self.chunk_size {
                emit(&sentences, &window, &mut sink);
                window = self.carry_over(&sentences, &window, sentence);
            }
            window.push(i, sentence);
        }
        if window.has_fresh() {
            emit(&sentences, &window, &mut sink);
        }
        sink.finish()
    }

    /// Start the next window with the longest suffix of `prev` that fits in
    /// `overlap`, leaves room for `next`, and is never all of `prev`.
    fn carry_over(&self, sentences: &[Sentence], prev: &Window, next: &Sentence) -> Window {
        let mut count = 0;
        let mut chars = 0;
        while count + 1 < prev.count {
            let candidate = &sentences[prev.first + prev.count - 1 - count];
            let grown = if count == 0 {
                candidate.len()
            } else {
                chars + 1 + candidate.len()
            };
            if grown > self.overlap || grown + 1 + next.len() > self.chunk_size {
                break;
            }
            chars = grown;
            count += 1;
        }
        Window {
            first: prev.first + prev.count - count,
            count,
            carried: count,
            chars,
        }
    }
}

fn emit(sentences: &[Sentence], window: &Window, sink: &mut ChunkSink) {
    let members = &sentences[window.first..window.first + window.count];
    let content = members
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    sink.push(
        content,
        json!({
            "strategy": ChunkStrategy::SentenceAware.as_str(),
            "start_char": members[0].start,
            "end_char": members[members.len() - 1].end,
            "sentence_start": window.first,
            "sentence_count": window.count,
            "overlap_sentences": window.carried,
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn contents(records: &[ChunkRecord]) -> Vec<&str> {
        records.iter().map(|r| r.content.as_str()).collect()
    }

    #[test]
    fn splits_on_terminators_followed_by_space() {
        let s = split_sentences("Pi is 3.14 today. Really?  Yes!\nOk... done");
        let texts: Vec<&str> = s.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Pi is 3.14 today.", "Really?", "Yes!", "Ok...", "done"]);
        assert_eq!(s[1].start, 18);
        assert_eq!(s[1].end, 25);
    }

    #[test]
    fn tiny_chunk_size_never_splits_a_sentence() {
        let records = SentenceChunker::new(2, 1).unwrap().chunk("A. B. C. D. E.");
        assert_eq!(contents(&records), vec!["A.", "B.", "C.", "D.", "E."]);
        for r in &records {
            assert!(r.content.ends_with('.'));
        }
    }

    #[test]
    fn small_chunk_size_with_default_overlap_makes_progress() {
        let records = SentenceChunker::new(3, 2).unwrap().chunk("A. B. C. D. E.");
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.content.ends_with('.')));
        assert!(records.iter().all(|r| r.content.contains("A.") == (r.index == 0)));
    }

    #[test]
    fn packs_sentences_up_to_chunk_size() {
        let records = SentenceChunker::new(10, 0).unwrap().chunk("A. B. C. D. E.");
        assert_eq!(contents(&records), vec!["A. B. C.", "D. E."]);
        assert_eq!(records[0].metadata["sentence_count"], 3);
        assert_eq!(records[1].metadata["sentence_start"], 3);
        assert_eq!(records[1].metadata["start_char"], 9);
        assert_eq!(records[1].metadata["end_char"], 14);
    }

    #[test]
    fn carries_trailing_sentences_as_overlap() {
        let records = SentenceChunker::new(10, 5).unwrap().chunk("A. B. C. D. E.");
        assert_eq!(contents(&records), vec!["A. B. C.", "B. C. D.", "C. D. E."]);
        assert_eq!(records[1].metadata["overlap_sentences"], 2);
        assert_eq!(records[2].metadata["overlap_sentences"], 2);
        assert_eq!(records[2].metadata["sentence_start"], 2);
    }

    #[test]
    fn long_sentence_is_its_own_chunk() {
        let long = format!("{}.", "word ".repeat(30).trim_end());
        let text = format!("Short one. {} Tail.", long);
        let records = SentenceChunker::new(40, 10).unwrap().chunk(&text);
        assert_eq!(contents(&records), vec!["Short one.", long.as_str(), "Tail."]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        let chunker = SentenceChunker::new(100, 10).unwrap();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk(" \n\t").is_empty());
    }

    proptest! {
        #[test]
        fn prop_chunks_end_on_sentence_boundaries(
            words in prop::collection::vec(
                ("[a-z]{1,8}", prop::sample::select(vec![".", "!", "?", ""])),
                1..60,
            ),
            size in 5usize..80,
            overlap_pct in 0usize..100,
        ) {
            let text = words
                .iter()
                .map(|(w, p)| format!("{}{}", w, p))
                .collect::<Vec<_>>()
                .join(" ");
            let overlap = size * overlap_pct / 100;
            let records = SentenceChunker::new(size, overlap).unwrap().chunk(&text);
            let sentences = split_sentences(&text);
            prop_assert!(!records.is_empty());

            let mut next_fresh = 0usize;
            for (i, r) in records.iter().enumerate() {
                prop_assert_eq!(r.index as usize, i);
                let start = r.metadata["sentence_start"].as_u64().unwrap() as usize;
                let count = r.metadata["sentence_count"].as_u64().unwrap() as usize;
                let carried = r.metadata["overlap_sentences"].as_u64().unwrap() as usize;
                prop_assert!(carried < count);
                prop_assert_eq!(start + carried, next_fresh);
                next_fresh = start + count;
                let last = &sentences[start + count - 1];
                prop_assert!(r.content.ends_with(last.text.as_str()));
            }
            prop_assert_eq!(next_fresh, sentences.len());
        }
    }
}
