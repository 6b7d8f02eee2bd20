//! Indexing and query orchestration.
//!
//! The [`IndexingPipeline`] runs chunk → embed → persist for one user's
//! document set; the [`QueryPipeline`] runs retrieve → compose for one
//! question. Each provider phase is bounded by the configured timeout.
//!
//! # Example
//!
//! ```rust,ignore
//! use docschat_rag::{IndexingPipeline, QueryPipeline, RagConfig};
//!
//! let indexing = IndexingPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(embedder.clone())
//!     .build()?;
//! indexing.run("alice", &documents, &index_dir).await?;
//!
//! let query = QueryPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(embedder)
//!     .generator(generator)
//!     .build()?;
//! let answer = query.run("alice", &index_dir, "What are cats?").await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::composer::AnswerComposer;
use crate::config::RagConfig;
use crate::document::{Answer, Chunk, Document};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerativeModel;
use crate::index::EmbeddingIndex;
use crate::retriever::Retriever;

/// Run `future`, failing with [`RagError::Timeout`] if it exceeds `limit`.
async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| RagError::Timeout { operation, timeout: limit })?
}

/// Builds and publishes a user's index from their documents.
///
/// All-or-nothing: the index on disk is replaced only after every chunk has
/// been embedded. Any failure leaves the previous index untouched.
pub struct IndexingPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    chunker: Arc<dyn Chunker>,
}

impl IndexingPipeline {
    /// Create a new [`IndexingPipelineBuilder`].
    pub fn builder() -> IndexingPipelineBuilder {
        IndexingPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Chunk `documents`, embed the chunks and persist the index at `index_path`.
    ///
    /// Returns the index that was persisted.
    ///
    /// # Errors
    ///
    /// Propagates chunking, embedding ([`RagError::EmbeddingError`],
    /// [`RagError::Timeout`]) and storage failures unchanged. Nothing is
    /// written unless every step before persisting succeeded.
    pub async fn run(
        &self,
        user: &str,
        documents: &[Document],
        index_path: &Path,
    ) -> Result<EmbeddingIndex> {
        info!(user, documents = documents.len(), "encoding documents");
        let started = Instant::now();

        let chunks: Vec<Chunk> =
            documents.iter().flat_map(|document| self.chunker.chunk(document)).collect();
        let chunking_ms = started.elapsed().as_millis();
        info!(user, chunks = chunks.len(), chunking_ms, "chunked documents");

        let index = bounded(
            "embed",
            self.config.request_timeout(),
            EmbeddingIndex::build_batched(
                &chunks,
                self.embedding_provider.as_ref(),
                self.config.embedding_batch_size,
            ),
        )
        .await
        .inspect_err(|e| error!(user, operation = "embed", error = %e, "index build failed"))?;
        let embedding_ms = started.elapsed().as_millis();

        let index = index.persist_async(index_path).await.inspect_err(
            |e| error!(user, operation = "persist", error = %e, "index persist failed"),
        )?;

        info!(
            user,
            index_path = %index_path.display(),
            vectors = index.len(),
            chunking_ms,
            embedding_ms,
            "encoding completed"
        );
        Ok(index)
    }
}

/// Builder for constructing an [`IndexingPipeline`].
///
/// `config` and `embedding_provider` are required. Without an explicit
/// chunker a [`RecursiveChunker`] is built from the config's chunk size and
/// overlap.
#[derive(Default)]
pub struct IndexingPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl IndexingPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Replace the default chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`IndexingPipeline`], validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<IndexingPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?),
        };

        Ok(IndexingPipeline { config, embedding_provider, chunker })
    }
}

/// Answers a question from a user's persisted index.
///
/// When retrieval finds nothing (an empty index) the generator is still
/// called, with an empty context block.
pub struct QueryPipeline {
    config: RagConfig,
    retriever: Retriever,
    composer: AnswerComposer,
}

impl QueryPipeline {
    /// Create a new [`QueryPipelineBuilder`].
    pub fn builder() -> QueryPipelineBuilder {
        QueryPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Retrieve the top `top_k` passages for `query` from the index at
    /// `index_path` and generate an answer from them.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] for an empty question.
    /// - Retrieval errors ([`RagError::IndexNotFound`],
    ///   [`RagError::IndexCorrupt`], [`RagError::EmbeddingMismatch`],
    ///   [`RagError::EmbeddingError`]) and generation errors, unchanged.
    /// - [`RagError::Timeout`] if a phase exceeds the configured limit.
    pub async fn run(&self, user: &str, index_path: &Path, query: &str) -> Result<Answer> {
        if query.trim().is_empty() {
            return Err(RagError::ConfigError("question must not be empty".to_string()));
        }
        info!(user, query, "answering question");
        let started = Instant::now();
        let limit = self.config.request_timeout();

        let contexts = bounded(
            "retrieve",
            limit,
            self.retriever.retrieve(index_path, query, self.config.top_k),
        )
        .await
        .inspect_err(|e| error!(user, operation = "retrieve", error = %e, "retrieval failed"))?;
        let retrieval_ms = started.elapsed().as_millis();
        info!(user, contexts = contexts.len(), retrieval_ms, "retrieved contexts");

        let answer = bounded("generate", limit, self.composer.compose(query, contexts))
            .await
            .inspect_err(
                |e| error!(user, operation = "generate", error = %e, "generation failed"),
            )?;

        info!(user, answer_chars = answer.text.len(), "answered question");
        Ok(answer)
    }
}

/// Builder for constructing a [`QueryPipeline`]. All fields are required.
#[derive(Default)]
pub struct QueryPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn GenerativeModel>>,
}

impl QueryPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for queries.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generative model.
    pub fn generator(mut self, generator: Arc<dyn GenerativeModel>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the [`QueryPipeline`], validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<QueryPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::ConfigError("generator is required".to_string()))?;

        let composer = AnswerComposer::new(generator, config.max_output_tokens);
        Ok(QueryPipeline { config, retriever: Retriever::new(embedding_provider), composer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{HashingEmbedder, MockGenerator};

    #[test]
    fn indexing_builder_requires_embedder() {
        let err = IndexingPipeline::builder().config(RagConfig::default()).build().err().unwrap();
        assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("embedding_provider")));
    }

    #[test]
    fn query_builder_requires_generator() {
        let err = QueryPipeline::builder()
            .config(RagConfig::default())
            .embedding_provider(Arc::new(HashingEmbedder::new(8)))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("generator")));
    }

    #[test]
    fn builders_reject_invalid_config() {
        let mut config = RagConfig::default();
        config.top_k = 0;
        let err = QueryPipeline::builder()
            .config(config)
            .embedding_provider(Arc::new(HashingEmbedder::new(8)))
            .generator(Arc::new(MockGenerator::new("ok")))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[tokio::test]
    async fn empty_question_is_rejected_before_any_call() {
        let generator = Arc::new(MockGenerator::new("ok"));
        let pipeline = QueryPipeline::builder()
            .config(RagConfig::default())
            .embedding_provider(Arc::new(HashingEmbedder::new(8)))
            .generator(generator.clone())
            .build()
            .unwrap();
        let err = pipeline.run("alice", Path::new("/nonexistent"), "   ").await.unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
        assert!(generator.calls().is_empty());
    }
}
