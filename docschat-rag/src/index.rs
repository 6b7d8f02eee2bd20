//! Per-user embedding index with cosine-similarity search and atomic persistence.
//!
//! An [`EmbeddingIndex`] is built wholesale from a set of chunks, written to
//! disk with [`persist`](EmbeddingIndex::persist) and read back with
//! [`load`](EmbeddingIndex::load). There is no partial update: every encode
//! run produces a fresh index that replaces the previous one in a single
//! rename, so a concurrent reader sees either the old or the new index.
//!
//! Vectors are L2-normalised on insertion and queries are normalised before
//! search, so the score is the dot product (cosine similarity). The metric is
//! recorded in the persisted file and checked on load.

use std::fs;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::{Chunk, RetrievalResult, SearchResult};
use crate::embedding::{EmbeddingProvider, describe};
use crate::error::{RagError, Result};

/// Name of the index file inside an index directory.
pub const INDEX_FILE_NAME: &str = "index.json";

/// Version of the on-disk layout written by this crate.
const FORMAT_VERSION: u32 = 1;

/// Default number of texts per embedding request used by [`EmbeddingIndex::build`].
const DEFAULT_BATCH_SIZE: usize = 100;

/// Similarity metric of an index. Fixed for the lifetime of the index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity over L2-normalised vectors.
    Cosine,
}

/// One stored chunk and its normalised embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct IndexEntry {
    content: String,
    source_document: String,
    position: usize,
    vector: Vec<f32>,
}

impl IndexEntry {
    fn to_chunk(&self) -> Chunk {
        Chunk {
            content: self.content.clone(),
            source_document: self.source_document.clone(),
            position: self.position,
        }
    }
}

/// An in-memory collection of chunk embeddings supporting k-NN search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingIndex {
    format_version: u32,
    metric: Metric,
    model: String,
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

impl EmbeddingIndex {
    /// Create an empty index for the given embedding space.
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            metric: Metric::Cosine,
            model: model.into(),
            dimensions,
            entries: Vec::new(),
        }
    }

    /// Embed every chunk and return the resulting index.
    ///
    /// See [`build_batched`](EmbeddingIndex::build_batched).
    pub async fn build(chunks: &[Chunk], embedder: &dyn EmbeddingProvider) -> Result<Self> {
        Self::build_batched(chunks, embedder, DEFAULT_BATCH_SIZE).await
    }

    /// Embed every chunk, `batch_size` texts per provider call, and return the
    /// resulting index. An empty chunk list yields an empty index.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmbeddingError`] if the provider fails, returns the
    ///   wrong number of vectors, or returns a NaN or infinite component.
    /// - [`RagError::EmbeddingMismatch`] if a returned vector does not have
    ///   the provider's advertised dimensionality.
    pub async fn build_batched(
        chunks: &[Chunk],
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        let mut index = Self::new(embedder.model(), embedder.dimensions());
        index.entries.reserve(chunks.len());

        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::EmbeddingError {
                    provider: embedder.model().to_string(),
                    message: format!(
                        "provider returned {} vectors for {} inputs",
                        vectors.len(),
                        batch.len()
                    ),
                });
            }
            debug!(batch_size = batch.len(), "embedded batch");

            for (chunk, vector) in batch.iter().zip(vectors) {
                index.insert(chunk, vector)?;
            }
        }

        Ok(index)
    }

    /// Append a chunk with its embedding.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmbeddingMismatch`] if the vector length differs from
    ///   the index dimensionality.
    /// - [`RagError::EmbeddingError`] if a component is NaN or infinite.
    pub fn insert(&mut self, chunk: &Chunk, vector: Vec<f32>) -> Result<()> {
        self.check_dimensions(vector.len())?;
        self.check_finite(&vector)?;
        self.entries.push(IndexEntry {
            content: chunk.content.clone(),
            source_document: chunk.source_document.clone(),
            position: chunk.position,
            vector: normalize(vector),
        });
        Ok(())
    }

    /// Name of the embedding model the index was built with.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Dimensionality of the stored vectors.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The similarity metric.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The stored chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        self.entries.iter().map(IndexEntry::to_chunk)
    }

    /// Return up to `k` chunks ranked by descending cosine similarity to
    /// `query`. Equal scores keep insertion order. Asking for more than the
    /// index holds returns everything.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] if `k == 0`.
    /// - [`RagError::EmbeddingMismatch`] if `query` has a different
    ///   dimensionality than the index.
    /// - [`RagError::EmbeddingError`] if `query` has a NaN or infinite component.
    pub fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::ConfigError("k must be greater than zero".to_string()));
        }
        self.check_dimensions(query.len())?;
        self.check_finite(query)?;

        let query = normalize(query.to_vec());
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, dot(&entry.vector, &query)))
            .collect();

        // Stable sort: ties stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        let hits = scored
            .into_iter()
            .map(|(i, score)| SearchResult { chunk: self.entries[i].to_chunk(), score })
            .collect();
        Ok(RetrievalResult { hits })
    }

    /// Write the index to `dir/index.json`, replacing any previous index.
    ///
    /// The data is written to a temporary file in `dir`, flushed to disk and
    /// renamed over the target, so readers never observe a partial index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StorageError`] if any filesystem step fails. The
    /// previous index, if any, is left untouched in that case.
    pub fn persist(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        let target = dir.join(INDEX_FILE_NAME);
        let storage = |source| RagError::StorageError { path: target.clone(), source };

        fs::create_dir_all(dir).map_err(storage)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".index-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(storage)?;

        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, self)
                .map_err(|e| storage(std::io::Error::other(e)))?;
            writer.flush().map_err(storage)?;
        }
        tmp.as_file().sync_all().map_err(storage)?;
        tmp.persist(&target).map_err(|e| storage(e.error))?;

        info!(path = %target.display(), vectors = self.len(), "persisted index");
        Ok(())
    }

    /// [`persist`](EmbeddingIndex::persist) on the blocking thread pool.
    ///
    /// Hands the index back once it has been written.
    pub async fn persist_async(self, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let target = index_file(&dir);
        tokio::task::spawn_blocking(move || self.persist(&dir).map(|()| self))
            .await
            .map_err(|e| RagError::StorageError {
                path: target,
                source: std::io::Error::other(e),
            })?
    }

    /// [`load`](EmbeddingIndex::load) with the file read and parsed on the
    /// blocking thread pool.
    pub async fn load_async(
        dir: impl AsRef<Path>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let path = index_file(&dir);
        let index = tokio::task::spawn_blocking(move || Self::read(&dir))
            .await
            .map_err(|e| corrupt(&path, format!("reader task failed: {e}")))??;
        index.check_embedder(embedder)?;
        Ok(index)
    }

    /// Read the index stored in `dir` and check it against `embedder`.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotFound`] if `dir` holds no index.
    /// - [`RagError::IndexCorrupt`] if the file cannot be parsed, has an
    ///   unsupported version, or holds vectors of the wrong length.
    /// - [`RagError::EmbeddingMismatch`] if the index was built with a
    ///   different embedding model or dimensionality than `embedder`.
    pub fn load(dir: impl AsRef<Path>, embedder: &dyn EmbeddingProvider) -> Result<Self> {
        let index = Self::read(dir)?;
        index.check_embedder(embedder)?;
        Ok(index)
    }

    /// Read and validate the index stored in `dir` without checking the embedder.
    pub fn read(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(INDEX_FILE_NAME);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RagError::IndexNotFound { path: dir.as_ref().to_path_buf() });
            }
            Err(e) => return Err(corrupt(&path, format!("cannot open: {e}"))),
        };

        let index: EmbeddingIndex = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| corrupt(&path, format!("cannot parse: {e}")))?;
        index.validate(&path)?;

        debug!(path = %path.display(), vectors = index.len(), "loaded index");
        Ok(index)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(corrupt(
                path,
                format!("unsupported format version {}", self.format_version),
            ));
        }
        if let Some((i, entry)) =
            self.entries.iter().enumerate().find(|(_, e)| e.vector.len() != self.dimensions)
        {
            return Err(corrupt(
                path,
                format!(
                    "entry {i} has {} dimensions, expected {}",
                    entry.vector.len(),
                    self.dimensions
                ),
            ));
        }
        Ok(())
    }

    fn check_embedder(&self, embedder: &dyn EmbeddingProvider) -> Result<()> {
        if self.model != embedder.model() || self.dimensions != embedder.dimensions() {
            return Err(RagError::EmbeddingMismatch {
                index: describe(&self.model, self.dimensions),
                query: describe(embedder.model(), embedder.dimensions()),
            });
        }
        Ok(())
    }

    /// JSON cannot represent NaN or infinity.
    fn check_finite(&self, vector: &[f32]) -> Result<()> {
        if vector.iter().all(|x| x.is_finite()) {
            return Ok(());
        }
        Err(RagError::EmbeddingError {
            provider: self.model.clone(),
            message: "non-finite embedding value".to_string(),
        })
    }

    fn check_dimensions(&self, got: usize) -> Result<()> {
        if got != self.dimensions {
            return Err(RagError::EmbeddingMismatch {
                index: describe(&self.model, self.dimensions),
                query: format!("a {got}-dimensional vector"),
            });
        }
        Ok(())
    }
}

/// Path of the index file inside an index directory.
pub fn index_file(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(INDEX_FILE_NAME)
}

fn corrupt(path: &Path, message: String) -> RagError {
    RagError::IndexCorrupt { path: path.to_path_buf(), message }
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
