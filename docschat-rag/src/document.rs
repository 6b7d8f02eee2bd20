//! Data types for documents, chunks, retrieval results and answers.

use serde::{Deserialize, Serialize};

/// A source document belonging to one user's document set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// The filename the document was uploaded under.
    pub filename: String,
    /// The extracted text content of the document.
    pub text: String,
}

impl Document {
    /// Create a document from a filename and its text.
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self { filename: filename.into(), text: text.into() }
    }
}

/// A contiguous slice of a [`Document`]'s text, the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The chunk text. Never contains a tab character.
    pub content: String,
    /// Filename of the [`Document`] the chunk was cut from.
    pub source_document: String,
    /// Ordinal of the chunk within its document, starting at zero.
    pub position: usize,
}

/// A retrieved [`Chunk`] paired with its cosine similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Chunks ranked by similarity to a query, most similar first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// The ranked hits.
    pub hits: Vec<SearchResult>,
}

impl RetrievalResult {
    /// The chunk texts in ranked order.
    pub fn contexts(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.chunk.content.as_str()).collect()
    }

    /// Number of retrieved chunks.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Whether nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

impl From<Vec<SearchResult>> for RetrievalResult {
    fn from(hits: Vec<SearchResult>) -> Self {
        Self { hits }
    }
}

/// A generated answer together with the question and context it was produced from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// The user's question.
    pub query: String,
    /// The passages the answer was conditioned on.
    pub contexts: RetrievalResult,
    /// The generated text.
    pub text: String,
}
