//! Boundary-aware text chunker with overlapping windows.
//!
//! Splits extracted paper text into [`Chunk`]s sized for embedding. Chunks
//! end on natural boundaries (paragraph breaks and sentence ends) whenever
//! one falls inside the size limit, and consecutive chunks share an overlap
//! window so that a passage spanning a boundary is still retrievable.
//!
//! # Algorithm
//!
//! 1. Convert `target_tokens` and `overlap_tokens` to bytes using a
//!    4 bytes/token ratio (see [`estimate_tokens`]).
//! 2. Collect boundary positions: the start of the text following a
//!    paragraph break (`\n\n`) or a sentence terminator (`.`, `!`, `?`)
//!    followed by whitespace.
//! 3. From `start`, end the chunk at the furthest boundary within the limit.
//!    If there is none, or it would produce a chunk under half the limit,
//!    hard-split at the last whitespace before the limit.
//! 4. Start the next chunk `overlap` bytes before the previous end, moved
//!    forward to the next word start.
//!
//! Chunk offsets are byte offsets into the original text and always fall on
//! UTF-8 char boundaries, so `&text[c.start_offset..c.end_offset] == c.text`.
//!
//! # Example
//!
//! ```rust
//! use syntopical_core::chunk::{chunk_text, ChunkParams};
//!
//! let chunks = chunk_text("doc-123", "Hello world.\n\nSecond paragraph.", &ChunkParams::new(200, 40));
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].start_offset, 0);
//! ```

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{chunk_id, Chunk};

/// Approximate bytes-per-token ratio.
///
/// The same estimate is used for chunk sizing and for the context budget.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimated token count of `text`: `ceil(bytes / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Chunk sizing parameters, in estimated tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
}

impl ChunkParams {
    pub fn new(target_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            target_tokens,
            overlap_tokens,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_tokens == 0 {
            return Err(Error::InvalidInput(
                "chunk target_tokens must be > 0".to_string(),
            ));
        }
        if self.overlap_tokens >= self.target_tokens {
            return Err(Error::InvalidInput(format!(
                "chunk overlap_tokens ({}) must be smaller than target_tokens ({})",
                self.overlap_tokens, self.target_tokens
            )));
        }
        Ok(())
    }

    fn max_bytes(&self) -> usize {
        (self.target_tokens * CHARS_PER_TOKEN).max(CHARS_PER_TOKEN)
    }

    fn overlap_bytes(&self) -> usize {
        (self.overlap_tokens * CHARS_PER_TOKEN).min(self.max_bytes() - 1)
    }
}

/// Split `text` into overlapping chunks.
///
/// Returns an empty vector for empty or whitespace-only text; callers
/// decide how to report that. Output depends only on the arguments.
pub fn chunk_text(document_id: &str, text: &str, params: &ChunkParams) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let max = params.max_bytes();
    let overlap = params.overlap_bytes();
    let boundaries = natural_boundaries(text);

    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut prev_end = 0usize;
    loop {
        let end = chunk_end(text, &boundaries, start, prev_end, max);
        spans.push((start, end));
        if end >= text.len() {
            break;
        }
        start = next_start(text, start, end, overlap);
        prev_end = end;
    }

    let chunks: Vec<Chunk> = spans
        .into_iter()
        .filter(|&(s, e)| !text[s..e].trim().is_empty())
        .enumerate()
        .map(|(index, (s, e))| make_chunk(document_id, index, text, s, e))
        .collect();

    tracing::debug!(
        document_id,
        bytes = text.len(),
        chunks = chunks.len(),
        target_tokens = params.target_tokens,
        overlap_tokens = params.overlap_tokens,
        "chunked document"
    );

    chunks
}

/// Positions where a chunk may end: the first non-whitespace byte after a
/// paragraph break or sentence terminator. Always ends with `text.len()`.
fn natural_boundaries(text: &str) -> Vec<usize> {
    let mut out = Vec::new();
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        let is_break = match c {
            '.' | '!' | '?' => iter.peek().is_some_and(|&(_, n)| n.is_whitespace()),
            '\n' => iter.peek().is_some_and(|&(_, n)| n == '\n'),
            _ => false,
        };
        if !is_break {
            continue;
        }
        let mut pos = i + c.len_utf8();
        while let Some(&(j, n)) = iter.peek() {
            if !n.is_whitespace() {
                break;
            }
            pos = j + n.len_utf8();
            iter.next();
        }
        out.push(pos);
    }
    if out.last() != Some(&text.len()) {
        out.push(text.len());
    }
    out
}

/// End of the chunk starting at `start`. The result is always greater than
/// `floor` (the previous chunk's end) so every chunk adds new text.
fn chunk_end(text: &str, boundaries: &[usize], start: usize, floor: usize, max: usize) -> usize {
    let limit = start + max;
    if limit >= text.len() {
        return text.len();
    }

    let idx = boundaries.partition_point(|&b| b <= limit);
    if idx > 0 {
        let b = boundaries[idx - 1];
        if b > floor && b - start >= max / 2 {
            return b;
        }
    }

    // No usable sentence/paragraph boundary: split at the last whitespace.
    let limit = snap_to_char_boundary(text, limit);
    let window = &text[start..limit];
    if let Some((pos, c)) = window.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
        let split = start + pos + c.len_utf8();
        if split > floor {
            return split;
        }
    }
    if limit > floor {
        return limit;
    }
    next_char_boundary(text, floor)
}

/// Start of the chunk following `[start, end)`.
fn next_start(text: &str, start: usize, end: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return end;
    }
    let candidate = snap_to_char_boundary(text, end.saturating_sub(overlap));
    if candidate <= start {
        return end;
    }

    let at_word_start = text[..candidate]
        .chars()
        .next_back()
        .is_some_and(char::is_whitespace);
    if at_word_start {
        return candidate;
    }

    // Move forward past the partial word so the overlap begins cleanly.
    let window = &text[candidate..end];
    let mut seen_space = false;
    for (pos, c) in window.char_indices() {
        if c.is_whitespace() {
            seen_space = true;
        } else if seen_space {
            return candidate + pos;
        }
    }
    candidate
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn next_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index + 1;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i.min(s.len())
}

fn make_chunk(document_id: &str, index: usize, text: &str, start: usize, end: usize) -> Chunk {
    let slice = &text[start..end];
    let mut hasher = Sha256::new();
    hasher.update(slice.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: slice.to_string(),
        start_offset: start,
        end_offset: end,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prose(sentences: usize) -> String {
        (0..sentences)
            .map(|i| {
                let s = format!(
                    "Sentence {} discusses retrieval models and their evaluation on benchmarks.",
                    i
                );
                if i % 5 == 4 {
                    format!("{}\n\n", s)
                } else {
                    format!("{} ", s)
                }
            })
            .collect()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", &ChunkParams::new(200, 40));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!((chunks[0].start_offset, chunks[0].end_offset), (0, 13));
    }

    #[test]
    fn test_empty_and_blank_text() {
        assert!(chunk_text("doc1", "", &ChunkParams::new(200, 40)).is_empty());
        assert!(chunk_text("doc1", "  \n\n\t ", &ChunkParams::new(200, 40)).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let text = prose(60);
        let params = ChunkParams::new(50, 10);
        let a = chunk_text("doc1", &text, &params);
        let b = chunk_text("doc1", &text, &params);
        assert_eq!(a, b);
    }

    #[test]
    fn test_coverage_and_overlap() {
        let text = prose(80);
        let params = ChunkParams::new(50, 10);
        let chunks = chunk_text("doc1", &text, &params);
        assert!(chunks.len() > 3);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks.last().unwrap().end_offset, text.len());
        for pair in chunks.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            assert!(next.start_offset > prev.start_offset);
            assert!(next.start_offset <= prev.end_offset, "gap between chunks");
            assert!(next.end_offset > prev.end_offset);
            assert!(prev.end_offset - next.start_offset <= 10 * CHARS_PER_TOKEN);
        }
    }

    #[test]
    fn test_chunks_respect_size_and_offsets() {
        let text = prose(80);
        let params = ChunkParams::new(50, 10);
        for c in chunk_text("doc1", &text, &params) {
            assert!(c.end_offset > c.start_offset);
            assert!(c.text.len() <= 50 * CHARS_PER_TOKEN);
            assert_eq!(&text[c.start_offset..c.end_offset], c.text);
        }
    }

    #[test]
    fn test_prefers_sentence_boundaries() {
        let text = prose(40);
        let chunks = chunk_text("doc1", &text, &ChunkParams::new(60, 0));
        for c in &chunks[..chunks.len() - 1] {
            let trimmed = c.text.trim_end();
            assert!(trimmed.ends_with('.'), "chunk ends mid-sentence: {:?}", trimmed);
        }
    }

    #[test]
    fn test_zero_overlap_is_contiguous() {
        let text = prose(40);
        let chunks = chunk_text("doc1", &text, &ChunkParams::new(40, 0));
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_offset, pair[1].start_offset);
        }
    }

    #[test]
    fn test_hard_split_without_boundaries() {
        let text = "word ".repeat(500);
        let chunks = chunk_text("doc1", &text, &ChunkParams::new(25, 5));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 100);
            assert!(c.text.starts_with("word"));
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘".repeat(10);
        let chunks = chunk_text("doc1", &text, &ChunkParams::new(10, 3));
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert_eq!(&text[c.start_offset..c.end_offset], c.text);
        }
    }

    #[test]
    fn test_ids_and_hashes() {
        let text = prose(30);
        let chunks = chunk_text("doc1", &text, &ChunkParams::new(40, 8));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.id, chunk_id("doc1", i));
            assert_eq!(c.hash.len(), 64);
        }
    }

    #[test]
    fn test_validate_params() {
        assert!(ChunkParams::new(200, 40).validate().is_ok());
        assert!(ChunkParams::new(0, 0).validate().is_err());
        assert!(ChunkParams::new(40, 40).validate().is_err());
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
