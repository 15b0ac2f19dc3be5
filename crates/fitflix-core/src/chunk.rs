//! Sentence-aware text splitter with overlap.
//!
//! Splits document content into chunks bounded by a character budget
//! (`chunk_size`), preferring sentence boundaries and falling back to word
//! boundaries for sentences that are too long on their own. Consecutive
//! chunks share up to `chunk_overlap` characters of context.
//!
//! # Algorithm
//!
//! 1. Text no longer than `chunk_size` is returned unchanged as one chunk.
//! 2. Split into sentences on `.`, `!`, or `?` followed by whitespace. Each
//!    sentence keeps one trailing space.
//! 3. Accumulate sentences into a buffer. When the next sentence would
//!    overflow it, emit the trimmed buffer and start the next buffer with
//!    the overlap suffix of the emitted one (snapped forward to a word
//!    boundary), followed by the sentence.
//! 4. A sentence longer than `chunk_size` is split at word granularity with
//!    the same greedy/overlap policy. All but the last word piece are
//!    emitted; the last piece becomes the new buffer.
//! 5. Emit whatever remains in the buffer.
//!
//! Lengths are counted in characters, not bytes. Content is never
//! truncated: a single word longer than `chunk_size` becomes its own
//! oversized chunk.
//!
//! # Example
//!
//! ```rust
//! use fitflix_core::chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(1000, 200);
//! let chunks = splitter.split_text("Short enough to stay whole.").unwrap();
//! assert_eq!(chunks, vec!["Short enough to stay whole.".to_string()]);
//! ```

use std::collections::HashSet;
use std::sync::OnceLock;

use anyhow::{bail, Result};
use regex::Regex;
use serde::Serialize;

use crate::models::{Chunk, ChunkMetadata, Document};

/// Default target chunk size, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
/// Sections at or below this many characters are dropped by [`split_by_sections`].
const MIN_SECTION_CHARS: usize = 50;

fn sentence_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s+").expect("sentence boundary regex"))
}

fn section_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("section boundary regex"))
}

/// Splits text into overlapping, size-bounded chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl TextSplitter {
    /// Overlap is expected to be smaller than `chunk_size` but this is not
    /// enforced here; config validation rejects it earlier.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split one text into chunks.
    ///
    /// Text no longer than `chunk_size` comes back as a single chunk equal to
    /// the input, which includes the empty string.
    ///
    /// # Errors
    ///
    /// Fails only when `chunk_size` is zero.
    pub fn split_text(&self, text: &str) -> Result<Vec<String>> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if char_len(text) <= self.chunk_size {
            return Ok(vec![text.to_string()]);
        }

        let mut chunks = Vec::new();
        let mut buffer = String::new();

        for sentence in split_sentences(text) {
            let sentence_len = char_len(&sentence);
            if char_len(&buffer) + sentence_len <= self.chunk_size {
                buffer.push_str(&sentence);
                continue;
            }

            let mut carried = String::new();
            if !buffer.trim().is_empty() {
                chunks.push(buffer.trim().to_string());
                carried = self.overlap_text(&buffer).to_string();
            }

            if sentence_len > self.chunk_size {
                let mut pieces = self.split_long_sentence(&format!("{carried}{sentence}"));
                buffer = match pieces.pop() {
                    Some(last) => last + " ",
                    None => String::new(),
                };
                chunks.extend(pieces);
            } else {
                buffer = fit_overlap(&carried, self.chunk_size - sentence_len);
                buffer.push_str(&sentence);
            }
        }

        if !buffer.trim().is_empty() {
            chunks.push(buffer.trim().to_string());
        }

        Ok(chunks)
    }

    /// Split every document, stamping `chunk_id`, `total_chunks`, and
    /// `original_length` onto each chunk.
    ///
    /// A document that fails to split is logged and skipped; the rest of
    /// the batch still goes through.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut out = Vec::new();

        for doc in documents {
            let pieces = match self.split_text(&doc.content) {
                Ok(pieces) => pieces,
                Err(e) => {
                    tracing::error!(
                        "Failed to split document {}: {:#}",
                        doc.metadata.source,
                        e
                    );
                    continue;
                }
            };

            let total_chunks = pieces.len();
            let original_length = char_len(&doc.content);
            for (chunk_id, content) in pieces.into_iter().enumerate() {
                out.push(Chunk::new(
                    content,
                    ChunkMetadata {
                        document: doc.metadata.clone(),
                        chunk_id,
                        total_chunks,
                        original_length,
                    },
                ));
            }
        }

        tracing::info!(
            "Split {} documents into {} chunks",
            documents.len(),
            out.len()
        );
        out
    }

    /// Split on sections first, then fall back to [`split_text`](Self::split_text)
    /// for sections larger than `max_chunk_size` (defaults to `chunk_size`).
    pub fn adaptive_split(&self, text: &str, max_chunk_size: Option<usize>) -> Result<Vec<String>> {
        let max = max_chunk_size.unwrap_or(self.chunk_size);
        let inner = TextSplitter::new(max, self.chunk_overlap);

        let mut chunks = Vec::new();
        for section in split_by_sections(text) {
            if char_len(&section) <= max {
                chunks.push(section);
            } else {
                chunks.extend(inner.split_text(&section)?);
            }
        }
        Ok(chunks)
    }

    /// Greedily join consecutive chunks with a space while the merged text
    /// stays shorter than `chunk_size`.
    pub fn merge_small_chunks(&self, chunks: &[String]) -> Vec<String> {
        let mut merged = Vec::new();
        let mut current = String::new();

        for chunk in chunks {
            if char_len(&current) + char_len(chunk) < self.chunk_size {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(chunk);
            } else {
                if !current.is_empty() {
                    merged.push(current.trim().to_string());
                }
                current = chunk.clone();
            }
        }

        if !current.is_empty() {
            merged.push(current.trim().to_string());
        }
        merged
    }

    /// Tail of an emitted buffer carried into the next chunk.
    fn overlap_text<'a>(&self, text: &'a str) -> &'a str {
        if self.chunk_overlap == 0 {
            return "";
        }
        if char_len(text) <= self.chunk_overlap {
            return text;
        }
        let window = tail_chars(text, self.chunk_overlap);
        match window.find(' ') {
            Some(idx) if idx > 0 => &window[idx + 1..],
            _ => window,
        }
    }

    fn split_long_sentence(&self, sentence: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for word in sentence.split_whitespace() {
            let word_len = char_len(word);
            if current.is_empty() || joined_len(&current) + 1 + word_len <= self.chunk_size {
                current.push(word);
                continue;
            }

            pieces.push(current.join(" "));
            let mut overlap = self.overlap_words(&current);
            while !overlap.is_empty() && joined_len(&overlap) + 1 + word_len > self.chunk_size {
                overlap.remove(0);
            }
            current = overlap;
            current.push(word);
        }

        if !current.is_empty() {
            pieces.push(current.join(" "));
        }
        pieces
    }

    /// Whole words from the end of `words` that fit in `chunk_overlap`,
    /// counting one separator per word.
    fn overlap_words<'a>(&self, words: &[&'a str]) -> Vec<&'a str> {
        let mut taken = Vec::new();
        let mut length = 0;
        for word in words.iter().rev() {
            let cost = char_len(word) + 1;
            if length + cost > self.chunk_overlap {
                break;
            }
            taken.push(*word);
            length += cost;
        }
        taken.reverse();
        taken
    }
}

/// Split on blank lines, keeping trimmed sections longer than 50 characters.
pub fn split_by_sections(text: &str) -> Vec<String> {
    section_boundary()
        .split(text)
        .map(str::trim)
        .filter(|s| char_len(s) > MIN_SECTION_CHARS)
        .map(str::to_string)
        .collect()
}

/// Summary of a chunked corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SplittingStats {
    pub total_chunks: usize,
    pub unique_sources: usize,
    pub avg_chunk_length: f64,
    pub min_chunk_length: usize,
    pub max_chunk_length: usize,
    pub total_characters: usize,
}

pub fn splitting_stats(chunks: &[Chunk]) -> SplittingStats {
    if chunks.is_empty() {
        return SplittingStats::default();
    }

    let lengths: Vec<usize> = chunks.iter().map(|c| char_len(&c.content)).collect();
    let sources: HashSet<&str> = chunks
        .iter()
        .map(|c| c.metadata.document.source.as_str())
        .collect();
    let total: usize = lengths.iter().sum();

    SplittingStats {
        total_chunks: chunks.len(),
        unique_sources: sources.len(),
        avg_chunk_length: total as f64 / lengths.len() as f64,
        min_chunk_length: lengths.iter().copied().min().unwrap_or(0),
        max_chunk_length: lengths.iter().copied().max().unwrap_or(0),
        total_characters: total,
    }
}

/// Sentences with one trailing space each; blank pieces are dropped.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in sentence_boundary().find_iter(text) {
        // The match begins with a one-byte ASCII terminator.
        push_sentence(&mut sentences, &text[start..m.start() + 1]);
        start = m.end();
    }
    push_sentence(&mut sentences, &text[start..]);
    sentences
}

fn push_sentence(out: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        out.push(format!("{trimmed} "));
    }
}

/// Drop leading words from an overlap until it fits in `budget` characters.
fn fit_overlap(overlap: &str, budget: usize) -> String {
    let mut rest = overlap.trim_start();
    while char_len(rest) > budget {
        match rest.find(char::is_whitespace) {
            Some(i) => rest = rest[i..].trim_start(),
            None => return String::new(),
        }
    }
    rest.to_string()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn joined_len(words: &[&str]) -> usize {
    if words.is_empty() {
        return 0;
    }
    words.iter().map(|w| char_len(w)).sum::<usize>() + words.len() - 1
}

/// The last `n` characters of `s`.
fn tail_chars(s: &str, n: usize) -> &str {
    let len = char_len(s);
    if n >= len {
        return s;
    }
    match s.char_indices().nth(len - n) {
        Some((i, _)) => &s[i..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;

    fn doc(source: &str, content: &str) -> Document {
        Document {
            content: content.to_string(),
            metadata: DocumentMetadata {
                source: source.to_string(),
                file_path: format!("kb/{source}"),
                category: "general".to_string(),
                file_type: "markdown".to_string(),
            },
        }
    }

    /// 50 sentences of exactly 49 characters, joined by single spaces.
    fn tips_text() -> String {
        (0..50)
            .map(|i| {
                let mut s = format!("Tip {:02} about rest and hydration", i);
                while s.len() < 48 {
                    s.push('z');
                }
                s.push('.');
                s
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn longest_shared_prefix_suffix(prev: &str, next: &str) -> usize {
        let max = prev.len().min(next.len());
        (1..=max)
            .rev()
            .find(|&k| next.is_char_boundary(k) && prev.ends_with(&next[..k]))
            .unwrap_or(0)
    }

    fn assert_words_preserved(text: &str, chunks: &[String]) {
        let chunk_words: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        let mut pos = 0;
        for word in text.split_whitespace() {
            let found = chunk_words[pos..].iter().position(|w| *w == word);
            match found {
                Some(offset) => pos += offset + 1,
                None => panic!("word {:?} missing from chunks", word),
            }
        }
    }

    #[test]
    fn test_small_text_single_chunk() {
        let splitter = TextSplitter::new(1000, 200);
        let text = "Classes run every morning. Bring water!";
        assert_eq!(splitter.split_text(text).unwrap(), vec![text.to_string()]);
    }

    #[test]
    fn test_text_exactly_chunk_size() {
        let splitter = TextSplitter::new(10, 2);
        assert_eq!(splitter.split_text("abcdefghij").unwrap(), vec!["abcdefghij"]);
    }

    #[test]
    fn test_empty_text() {
        let splitter = TextSplitter::default();
        assert_eq!(splitter.split_text("").unwrap(), vec![String::new()]);
    }

    #[test]
    fn test_zero_chunk_size_is_error() {
        let splitter = TextSplitter::new(0, 0);
        assert!(splitter.split_text("anything").is_err());
    }

    #[test]
    fn test_worked_example_three_chunks() {
        let text = tips_text();
        assert_eq!(text.len(), 2499);

        let chunks = TextSplitter::new(1000, 200).split_text(&text).unwrap();
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.chars().count() <= 1000, "chunk too long: {}", c.len());
        }

        let shared = longest_shared_prefix_suffix(&chunks[0], &chunks[1]);
        assert!((100..=200).contains(&shared), "overlap was {}", shared);
        let shared = longest_shared_prefix_suffix(&chunks[1], &chunks[2]);
        assert!((100..=200).contains(&shared), "overlap was {}", shared);

        assert_words_preserved(&text, &chunks);
    }

    #[test]
    fn test_overlap_snaps_to_word_boundary() {
        let text = tips_text();
        let chunks = TextSplitter::new(1000, 200).split_text(&text).unwrap();
        let first_word = chunks[1].split_whitespace().next().unwrap();
        // "Tip" is dropped because the 200-char window starts exactly on it
        // and the overlap snaps past the first space.
        assert_eq!(first_word, "16");
    }

    #[test]
    fn test_zero_overlap_has_no_shared_text() {
        let text = tips_text();
        let chunks = TextSplitter::new(1000, 0).split_text(&text).unwrap();
        assert!(chunks[1].starts_with("Tip 20"));
        assert_words_preserved(&text, &chunks);
    }

    #[test]
    fn test_overlap_dropped_when_next_sentence_nearly_fills_chunk() {
        let first = "Warm up with five minutes of easy cardio before lifting.";
        let second =
            "Then finish every heavy session with ten minutes of slow stretching and mobility work.";
        let text = format!("{first} {second}");

        let chunks = TextSplitter::new(90, 40).split_text(&text).unwrap();
        // 86 + 1 chars leave no room for even the last word of the overlap.
        assert_eq!(chunks, vec![first.to_string(), second.to_string()]);
        assert_eq!(longest_shared_prefix_suffix(&chunks[0], &chunks[1]), 0);
    }

    #[test]
    fn test_long_sentence_word_split() {
        let sentence = (0..120).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let text = format!("{sentence}.");
        let chunks = TextSplitter::new(100, 20).split_text(&text).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 100, "chunk too long: {:?}", c);
        }
        assert_words_preserved(&text, &chunks);
    }

    #[test]
    fn test_long_sentence_after_short_ones() {
        let long = (0..60).map(|i| format!("rep{i}")).collect::<Vec<_>>().join(" ");
        let text = format!("Warm up first. Stretch well. {long}. Cool down after.");
        let chunks = TextSplitter::new(80, 15).split_text(&text).unwrap();
        for c in &chunks {
            assert!(c.chars().count() <= 80, "chunk too long: {:?}", c);
        }
        assert_words_preserved(&text, &chunks);
        assert!(chunks.last().unwrap().ends_with("Cool down after."));
    }

    #[test]
    fn test_oversized_word_kept_whole() {
        let giant = "x".repeat(50);
        let text = format!("Short start here. {giant} tail words follow here.");
        let chunks = TextSplitter::new(20, 5).split_text(&text).unwrap();
        assert!(chunks.iter().any(|c| c == &giant));
        for c in chunks.iter().filter(|c| **c != giant) {
            assert!(c.chars().count() <= 20, "chunk too long: {:?}", c);
        }
        assert_words_preserved(&text, &chunks);
    }

    #[test]
    fn test_multibyte_text() {
        let text = "Ünïcödé sentence number one. ".repeat(20);
        let chunks = TextSplitter::new(60, 10).split_text(&text).unwrap();
        for c in &chunks {
            assert!(c.chars().count() <= 60);
        }
        assert_words_preserved(&text, &chunks);
    }

    #[test]
    fn test_deterministic() {
        let text = tips_text();
        let splitter = TextSplitter::new(300, 50);
        assert_eq!(splitter.split_text(&text).unwrap(), splitter.split_text(&text).unwrap());
    }

    #[test]
    fn test_split_documents_stamps_metadata() {
        let text = tips_text();
        let docs = vec![doc("classes.md", &text), doc("faq.md", "Short answer.")];
        let chunks = TextSplitter::new(1000, 200).split_documents(&docs);

        assert_eq!(chunks.len(), 4);
        for (i, c) in chunks[..3].iter().enumerate() {
            assert_eq!(c.metadata.chunk_id, i);
            assert_eq!(c.metadata.total_chunks, 3);
            assert_eq!(c.metadata.original_length, 2499);
            assert_eq!(c.metadata.document.source, "classes.md");
        }
        assert_eq!(chunks[3].metadata.chunk_id, 0);
        assert_eq!(chunks[3].metadata.total_chunks, 1);
        assert_eq!(chunks[3].content, "Short answer.");
    }

    #[test]
    fn test_split_documents_skips_failures() {
        let docs = vec![doc("a.md", "Some content.")];
        let chunks = TextSplitter::new(0, 0).split_documents(&docs);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_split_by_sections_drops_short() {
        let long = "This section talks about our strength training floor in detail.";
        let text = format!("Tiny.\n\n{long}\n   \n{long}");
        let sections = split_by_sections(&text);
        assert_eq!(sections, vec![long.to_string(), long.to_string()]);
    }

    #[test]
    fn test_adaptive_split() {
        let small = "A section that is comfortably longer than fifty characters in total.";
        let big = tips_text();
        let text = format!("{small}\n\n{big}");
        let chunks = TextSplitter::new(1000, 200).adaptive_split(&text, None).unwrap();
        assert_eq!(chunks[0], small);
        assert_eq!(chunks.len(), 4);
    }

    #[test]
    fn test_merge_small_chunks() {
        let splitter = TextSplitter::new(20, 0);
        let merged = splitter.merge_small_chunks(&[
            "one".to_string(),
            "two".to_string(),
            "a much longer piece".to_string(),
        ]);
        assert_eq!(merged, vec!["one two".to_string(), "a much longer piece".to_string()]);
    }

    #[test]
    fn test_splitting_stats() {
        let docs = vec![doc("a.md", "12345"), doc("b.md", "1234567890")];
        let chunks = TextSplitter::default().split_documents(&docs);
        let stats = splitting_stats(&chunks);
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.unique_sources, 2);
        assert_eq!(stats.min_chunk_length, 5);
        assert_eq!(stats.max_chunk_length, 10);
        assert_eq!(stats.total_characters, 15);
        assert!((stats.avg_chunk_length - 7.5).abs() < 1e-9);

        assert_eq!(splitting_stats(&[]).total_chunks, 0);
    }
}
