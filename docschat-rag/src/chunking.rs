//! Document chunking.
//!
//! This module provides the [`Chunker`] trait, the [`RecursiveChunker`] used
//! by the indexing pipeline, and [`chunk_documents`] which applies it to a
//! whole document set.
//!
//! Lengths are measured in characters, not bytes, so multi-byte text is never
//! cut inside a code point.

use std::collections::VecDeque;

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Separators tried in order: paragraph, line, sentence, word, character.
const SEPARATORS: [&str; 7] = ["\n\n", "\n", ". ", "? ", "! ", " ", ""];

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no non-whitespace text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text hierarchically at the largest available boundary.
///
/// The text is split at the first separator of paragraph → line → sentence →
/// word → character that occurs in it. Pieces that fit are greedily merged
/// into chunks of at most `chunk_size` characters; each new chunk starts with
/// the trailing pieces of the previous one, up to `chunk_overlap` characters.
/// Pieces that are still too long are split again with the next separator.
/// Overlap is made of whole pieces, so it is zero when the pieces at the
/// chosen separator level are longer than `chunk_overlap`.
///
/// Chunks are trimmed and tabs are replaced with single spaces.
///
/// # Example
///
/// ```rust,ignore
/// use docschat_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(3000, 200)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Split raw text into chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);
        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            let next =
                if remaining.is_empty() { &SEPARATORS[SEPARATORS.len() - 1..] } else { remaining };
            chunks.extend(self.split_recursive(piece, next));
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }
        chunks
    }

    /// Greedily merge pieces (each no longer than `chunk_size`) into chunks,
    /// carrying up to `chunk_overlap` characters of trailing pieces forward.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some((_, dropped)) = window.pop_front() else { break };
                    total -= dropped;
                }
            }
            window.push_back((piece, len));
            total += len;
        }

        push_joined(&mut chunks, &window);
        chunks
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.trim().is_empty() {
            return Vec::new();
        }

        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(position, text)| Chunk {
                content: text.replace('\t', " "),
                source_document: document.filename.clone(),
                position,
            })
            .collect()
    }
}

/// Chunk every document independently with a [`RecursiveChunker`].
///
/// Chunks keep document order, then position order.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if `chunk_overlap >= chunk_size` or
/// `chunk_size` is zero.
pub fn chunk_documents(
    documents: &[Document],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    let chunker = RecursiveChunker::new(chunk_size, chunk_overlap)?;
    Ok(documents.iter().flat_map(|document| chunker.chunk(document)).collect())
}

/// First separator present in `text`, plus the finer separators after it.
/// Falls back to character splitting.
fn pick_separator<'s>(text: &str, separators: &'s [&'s str]) -> (&'s str, &'s [&'s str]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() || text.contains(separator) {
            return (*separator, &separators[i + 1..]);
        }
    }
    ("", &[])
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
/// An empty separator splits into single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(filename: &str, text: &str) -> Document {
        Document::new(filename, text)
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        assert!(matches!(RecursiveChunker::new(10, 10), Err(RagError::ConfigError(_))));
        assert!(matches!(chunk_documents(&[], 10, 20), Err(RagError::ConfigError(_))));
        assert!(matches!(RecursiveChunker::new(0, 0), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn empty_document_produces_no_chunks() {
        let chunker = RecursiveChunker::new(100, 10).unwrap();
        assert!(chunker.chunk(&doc("a.txt", "")).is_empty());
        assert!(chunker.chunk(&doc("a.txt", " \n\n\t ")).is_empty());
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let chunker = RecursiveChunker::new(50, 0).unwrap();
        let chunks = chunker.chunk(&doc("cats.pdf", "Cats are mammals."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Cats are mammals.");
        assert_eq!(chunks[0].source_document, "cats.pdf");
        assert_eq!(chunks[0].position, 0);
    }

    #[test]
    fn one_document_per_sentence_set() {
        let docs = [doc("cats.pdf", "Cats are mammals."), doc("dogs.pdf", "Dogs are mammals too.")];
        let chunks = chunk_documents(&docs, 50, 0).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source_document, "cats.pdf");
        assert_eq!(chunks[1].content, "Dogs are mammals too.");
    }

    #[test]
    fn paragraphs_are_preferred_boundaries() {
        let chunker = RecursiveChunker::new(30, 0).unwrap();
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let chunks = chunker.split_text(text);
        assert_eq!(chunks, vec!["First paragraph here.", "Second paragraph here."]);
    }

    #[test]
    fn sentences_split_when_paragraph_is_too_long() {
        let chunker = RecursiveChunker::new(20, 0).unwrap();
        let chunks = chunker.split_text("One short line. Another one here. Third.");
        assert_eq!(chunks, vec!["One short line.", "Another one here.", "Third."]);
    }

    #[test]
    fn words_overlap_by_configured_amount() {
        let chunker = RecursiveChunker::new(10, 5).unwrap();
        let chunks = chunker.split_text("aaaa bbbb cccc dddd eeee");
        assert_eq!(chunks, vec!["aaaa bbbb", "bbbb cccc", "cccc dddd", "dddd eeee"]);
    }

    #[test]
    fn overlap_snaps_to_zero_when_pieces_exceed_it() {
        let chunker = RecursiveChunker::new(100, 30).unwrap();
        let sentences = [
            "The first sentence is long enough to exceed thirty. ",
            "A second sentence follows with similar length here. ",
            "Then a third one, again longer than the overlap. ",
            "And the final sentence closes out this short paragraph.",
        ];
        let chunks = chunker.split_text(&sentences.concat());
        let expected: Vec<&str> = sentences.iter().map(|s| s.trim()).collect();
        assert_eq!(chunks, expected);
    }

    #[test]
    fn long_words_fall_back_to_characters() {
        let chunker = RecursiveChunker::new(4, 1).unwrap();
        let chunks = chunker.split_text("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn multibyte_text_is_measured_in_characters() {
        let chunker = RecursiveChunker::new(3, 0).unwrap();
        let chunks = chunker.split_text("ééééé");
        assert_eq!(chunks, vec!["ééé", "éé"]);
    }

    #[test]
    fn tabs_become_spaces() {
        let chunker = RecursiveChunker::new(100, 0).unwrap();
        let chunks = chunker.chunk(&doc("t.txt", "col1\tcol2\tcol3"));
        assert_eq!(chunks[0].content, "col1 col2 col3");
    }

    #[test]
    fn positions_count_up_per_document() {
        let chunker = RecursiveChunker::new(10, 0).unwrap();
        let chunks = chunker.chunk(&doc("p.txt", "aaaa bbbb cccc dddd"));
        let positions: Vec<usize> = chunks.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1]);
    }
}
