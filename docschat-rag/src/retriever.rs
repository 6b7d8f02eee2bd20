//! Top-k passage retrieval against a persisted index.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::index::EmbeddingIndex;

/// Loads a user's index and returns the passages closest to a query.
///
/// The same embedder configuration must be used here as at build time;
/// [`EmbeddingIndex::load`] enforces it.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    /// Create a retriever that embeds queries with `embedder`.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    /// The embedder used for queries.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Load the index at `index_path`, embed `query` and return the `k`
    /// most similar chunks. The index is read off the async runtime.
    ///
    /// # Errors
    ///
    /// Everything [`EmbeddingIndex::load`], the embedder and
    /// [`EmbeddingIndex::search`] can fail with.
    pub async fn retrieve(
        &self,
        index_path: &Path,
        query: &str,
        k: usize,
    ) -> Result<RetrievalResult> {
        let index = EmbeddingIndex::load_async(index_path, self.embedder.as_ref()).await?;
        self.retrieve_from(&index, query, k).await
    }

    /// Like [`retrieve`](Retriever::retrieve) but against an index already in memory.
    pub async fn retrieve_from(
        &self,
        index: &EmbeddingIndex,
        query: &str,
        k: usize,
    ) -> Result<RetrievalResult> {
        let query_vector = self.embedder.embed(query).await?;
        let result = index.search(&query_vector, k)?;
        debug!(k, hits = result.len(), "retrieved contexts");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;
    use crate::error::RagError;
    use crate::mock::HashingEmbedder;

    fn chunk(content: &str) -> Chunk {
        Chunk { content: content.to_string(), source_document: "notes.txt".to_string(), position: 0 }
    }

    #[tokio::test]
    async fn retrieves_most_similar_chunk_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(HashingEmbedder::new(256));
        let chunks = [chunk("rust ownership and borrowing"), chunk("baking sourdough bread")];
        EmbeddingIndex::build(&chunks, embedder.as_ref()).await.unwrap().persist(dir.path()).unwrap();

        let retriever = Retriever::new(embedder);
        let result = retriever.retrieve(dir.path(), "how does borrowing work in rust", 1).await.unwrap();
        assert_eq!(result.contexts(), vec!["rust ownership and borrowing"]);
    }

    #[tokio::test]
    async fn embedder_with_other_dimensions_is_a_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = [chunk("anything")];
        EmbeddingIndex::build(&chunks, &HashingEmbedder::new(32))
            .await
            .unwrap()
            .persist(dir.path())
            .unwrap();

        let retriever = Retriever::new(Arc::new(HashingEmbedder::new(64)));
        let err = retriever.retrieve(dir.path(), "anything", 1).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingMismatch { .. }));
    }

    #[tokio::test]
    async fn missing_index_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = Retriever::new(Arc::new(HashingEmbedder::new(8)));
        let err = retriever.retrieve(&dir.path().join("nobody"), "q", 3).await.unwrap_err();
        assert!(matches!(err, RagError::IndexNotFound { .. }));
    }
}
