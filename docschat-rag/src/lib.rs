//! # docschat-rag
//!
//! Per-user document indexing and retrieval-augmented question answering.
//!
//! ## Overview
//!
//! Each user owns a document set, one persisted embedding index and an API
//! key. Encoding rebuilds the whole index; asking a question retrieves the
//! closest passages from it and conditions a generative model on them.
//!
//! - [`RecursiveChunker`] - splits documents at paragraph, sentence, word and
//!   character boundaries into overlapping chunks
//! - [`EmbeddingIndex`] - cosine-similarity index with atomic JSON persistence
//! - [`Retriever`] - loads an index and returns the top-k chunks for a query
//! - [`AnswerComposer`] - renders the prompt and calls the [`GenerativeModel`]
//! - [`IndexingPipeline`] / [`QueryPipeline`] - timeout-bounded orchestration
//! - [`DocsChat`] - per-user entry points over the document, credential and
//!   provider collaborators
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docschat_rag::{DocsChat, RagConfig, UserPaths};
//! use docschat_rag::openai::OpenAIProviderFactory;
//!
//! let paths = UserPaths::new("/srv/docschat");
//! paths.initialize()?;
//! let chat = DocsChat::filesystem(paths, RagConfig::default(), Arc::new(OpenAIProviderFactory::new()))?;
//!
//! let summary = chat.encode_documents("alice").await?;
//! let answer = chat.ask("alice", "What did the contract say about renewals?").await?;
//! println!("{}", answer.text);
//! ```
//!
//! ## Features
//!
//! - `pdf` (default) - PDF text extraction in [`FsDocumentStore`]
//! - `openai` - OpenAI embedding and chat providers

pub mod chunking;
pub mod composer;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;
pub mod paths;
pub mod pipeline;
pub mod retriever;
pub mod service;
pub mod store;

pub use chunking::{Chunker, RecursiveChunker, chunk_documents};
pub use composer::{AnswerComposer, TEMPERATURE};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Answer, Chunk, Document, RetrievalResult, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use generation::GenerativeModel;
pub use index::{EmbeddingIndex, INDEX_FILE_NAME, Metric};
pub use paths::{UserPaths, validate_user};
pub use pipeline::{IndexingPipeline, IndexingPipelineBuilder, QueryPipeline, QueryPipelineBuilder};
pub use retriever::Retriever;
pub use service::{DocsChat, DocsChatBuilder, EncodeSummary, ProviderFactory};
pub use store::{
    CredentialStore, DocumentRef, DocumentStore, FsCredentialStore, FsDocumentStore,
    InMemoryCredentialStore, InMemoryDocumentStore,
};
