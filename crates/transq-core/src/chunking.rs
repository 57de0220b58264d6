//! Boundary-aware text chunking for size-capped translation backends.
//!
//! Text is split hierarchically: paragraphs, then sentences, then clauses,
//! then words, and only as a last resort inside a word. At every level the
//! resulting pieces are packed greedily, so a chunk holds as many adjacent
//! pieces as fit under the limit together with the whitespace between them.
//!
//! # Example
//!
//! ```rust
//! use transq_core::chunking::{BoundaryChunker, Chunker};
//!
//! let chunker = BoundaryChunker::new(20);
//! let spans = chunker.chunk("One two. Three four! Five six?");
//!
//! assert_eq!(spans.len(), 2);
//! assert_eq!(spans[0].text, "One two. Three four!");
//! assert_eq!(spans[1].text, "Five six?");
//! ```
//!
//! Lengths are counted in `char`s; offsets are byte positions into the
//! original text and always fall on UTF-8 boundaries.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::QueueConfig;
use crate::error::{Error, Result};

/// Blank line, plus any whitespace that follows it.
static PARAGRAPH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t\r]*\n\s*").expect("paragraph pattern compiles"));

/// Sentence terminator with optional closing quote/bracket. Latin terminators
/// need trailing whitespace so decimals and abbreviations glued to the next
/// word stay intact; CJK terminators do not.
static SENTENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[.!?…]+["'”’»)\]]*\s+|[。！？]+["'”’」』）)]*\s*"#)
        .expect("sentence pattern compiles")
});

/// Clause punctuation. `1,000` is not a boundary.
static CLAUSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,;:]\s+|[，；：、]\s*").expect("clause pattern compiles"));

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("word pattern compiles"));

/// Split points in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Sentence,
    Clause,
    Word,
}

impl Boundary {
    const ORDER: [Boundary; 4] = [
        Boundary::Paragraph,
        Boundary::Sentence,
        Boundary::Clause,
        Boundary::Word,
    ];

    fn pattern(&self) -> &'static Regex {
        match self {
            Boundary::Paragraph => &PARAGRAPH_RE,
            Boundary::Sentence => &SENTENCE_RE,
            Boundary::Clause => &CLAUSE_RE,
            Boundary::Word => &WORD_RE,
        }
    }
}

/// A contiguous slice of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    /// Starting byte offset in the original text.
    pub start_offset: usize,
    /// Ending byte offset (exclusive) in the original text.
    pub end_offset: usize,
}

impl TextSpan {
    pub fn new(text: String, start_offset: usize, end_offset: usize) -> Self {
        Self {
            text,
            start_offset,
            end_offset,
        }
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Common trait for chunking strategies.
pub trait Chunker: Send + Sync {
    /// Split `text` into ordered spans.
    fn chunk(&self, text: &str) -> Vec<TextSpan>;

    /// Upper bound on characters per span.
    fn max_chunk_size(&self) -> usize;
}

/// Splits at the strongest boundary that yields pieces under the limit.
#[derive(Debug, Clone)]
pub struct BoundaryChunker {
    max_chunk_size: usize,
}

impl BoundaryChunker {
    /// Create a chunker. A limit of zero is treated as one.
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size: max_chunk_size.max(1),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.max_chunk_size)
    }

    fn fits(&self, text: &str) -> bool {
        // Byte length bounds char count from above; skip the scan when it can.
        text.len() <= self.max_chunk_size || text.chars().count() <= self.max_chunk_size
    }

    /// Chunk `text[start..end]`, trying boundaries from `level` onwards.
    fn chunk_range(&self, text: &str, start: usize, end: usize, level: usize) -> Vec<(usize, usize)> {
        if self.fits(&text[start..end]) {
            return vec![(start, end)];
        }

        let Some(boundary) = Boundary::ORDER.get(level) else {
            return self.hard_split(text, start, end);
        };

        let pieces = pieces(text, start, end, *boundary);
        if pieces.len() <= 1 {
            return self.chunk_range(text, start, end, level + 1);
        }

        let mut ranges = Vec::new();
        let mut current: Option<(usize, usize)> = None;

        for (piece_start, piece_end) in pieces {
            if !self.fits(&text[piece_start..piece_end]) {
                if let Some(range) = current.take() {
                    ranges.push(range);
                }
                ranges.extend(self.chunk_range(text, piece_start, piece_end, level + 1));
                continue;
            }

            current = match current {
                Some((current_start, _)) if self.fits(&text[current_start..piece_end]) => {
                    Some((current_start, piece_end))
                }
                Some(range) => {
                    ranges.push(range);
                    Some((piece_start, piece_end))
                }
                None => Some((piece_start, piece_end)),
            };
        }

        if let Some(range) = current {
            ranges.push(range);
        }
        ranges
    }

    /// Cut every `max_chunk_size` chars. Only reached for a single word
    /// longer than the limit.
    fn hard_split(&self, text: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
        let mut ranges = Vec::new();
        let mut chunk_start = start;
        let mut count = 0;

        for (offset, _) in text[start..end].char_indices() {
            if count == self.max_chunk_size {
                ranges.push((chunk_start, start + offset));
                chunk_start = start + offset;
                count = 0;
            }
            count += 1;
        }
        if chunk_start < end {
            ranges.push((chunk_start, end));
        }
        ranges
    }
}

impl Chunker for BoundaryChunker {
    fn chunk(&self, text: &str) -> Vec<TextSpan> {
        let Some((start, end)) = trim_range(text, 0, text.len()) else {
            return vec![];
        };

        self.chunk_range(text, start, end, 0)
            .into_iter()
            .map(|(s, e)| TextSpan::new(text[s..e].to_string(), s, e))
            .collect()
    }

    fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }
}

/// Split `text` into chunk strings of at most `max_chunk_size` chars.
pub fn split(text: &str, max_chunk_size: usize) -> Vec<String> {
    BoundaryChunker::new(max_chunk_size)
        .chunk(text)
        .into_iter()
        .map(|span| span.text)
        .collect()
}

/// Reassemble translated chunks using the source's own separators.
///
/// The gap between consecutive spans is reduced to a blank line, a newline,
/// a single space, or nothing (CJK sentences and mid-word cuts).
pub fn join_translated<S: AsRef<str>>(
    source: &str,
    spans: &[TextSpan],
    translations: &[S],
) -> Result<String> {
    if spans.len() != translations.len() {
        return Err(Error::Internal(format!(
            "{} translations for {} chunks",
            translations.len(),
            spans.len()
        )));
    }

    let mut joined = String::new();
    for (i, translation) in translations.iter().enumerate() {
        if i > 0 {
            let gap = source
                .get(spans[i - 1].end_offset..spans[i].start_offset)
                .unwrap_or(" ");
            joined.push_str(separator_for(gap));
        }
        joined.push_str(translation.as_ref().trim());
    }
    Ok(joined)
}

fn separator_for(gap: &str) -> &'static str {
    match gap.matches('\n').count() {
        0 if gap.is_empty() => "",
        0 => " ",
        1 => "\n",
        _ => "\n\n",
    }
}

/// Shrink `text[start..end]` to exclude surrounding whitespace.
fn trim_range(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let trimmed_start = start + (slice.len() - slice.trim_start().len());
    let trimmed_end = start + slice.trim_end().len();
    (trimmed_start < trimmed_end).then_some((trimmed_start, trimmed_end))
}

/// Pieces of `text[start..end]` between boundary matches. The terminator
/// stays with the preceding piece; the whitespace after it belongs to no piece.
fn pieces(text: &str, start: usize, end: usize, boundary: Boundary) -> Vec<(usize, usize)> {
    let segment = &text[start..end];
    let mut pieces = Vec::new();
    let mut piece_start = 0;

    for m in boundary.pattern().find_iter(segment) {
        let piece_end = m.start() + m.as_str().trim_end().len();
        if let Some(range) = trim_range(text, start + piece_start, start + piece_end.max(piece_start)) {
            pieces.push(range);
        }
        piece_start = m.end();
    }
    if let Some(range) = trim_range(text, start + piece_start, end) {
        pieces.push(range);
    }
    pieces
}
