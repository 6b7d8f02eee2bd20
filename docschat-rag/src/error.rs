//! Error types for the `docschat-rag` crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while encoding documents or answering questions.
///
/// Provider failures are surfaced exactly as the provider reported them; the
/// crate never retries. Every variant that concerns persisted state carries
/// the path involved so the host can tell the user what to re-encode.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid chunking, retrieval or service parameters.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A source document could not be read or decoded.
    #[error("Failed to load document '{filename}': {message}")]
    DocumentLoadError {
        /// Filename of the offending document.
        filename: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding provider rejected the request or failed.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generative model rejected the request, failed, or returned nothing.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generative model that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A provider call did not complete within the configured timeout.
    #[error("Operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        /// The pipeline phase that timed out (`embed`, `retrieve`, `generate`).
        operation: &'static str,
        /// The configured limit.
        timeout: Duration,
    },

    /// No index has been persisted at the given location.
    #[error("No index found at {}", path.display())]
    IndexNotFound {
        /// The index location that was searched.
        path: PathBuf,
    },

    /// The persisted index exists but cannot be used.
    #[error("Index at {} is corrupt: {message}", path.display())]
    IndexCorrupt {
        /// The index file.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },

    /// The embedder used for a query does not match the one the index was built with.
    #[error("Embedding mismatch: index uses {index}, query uses {query}")]
    EmbeddingMismatch {
        /// Model and dimensionality recorded in the index.
        index: String,
        /// Model and dimensionality of the query side.
        query: String,
    },

    /// The user has no provider API key configured.
    #[error("No API key configured for user '{user}'")]
    CredentialMissing {
        /// The user whose key is missing.
        user: String,
    },

    /// Writing the index to durable storage failed.
    #[error("Storage error at {}: {source}", path.display())]
    StorageError {
        /// The path being written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Another encode run for the same user has not finished yet.
    #[error("An encode run for user '{user}' is already in progress")]
    EncodeInProgress {
        /// The user whose index is being rebuilt.
        user: String,
    },
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
