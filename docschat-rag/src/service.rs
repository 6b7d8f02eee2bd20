//! Host-facing entry points: encode a user's documents, answer a user's question.
//!
//! [`DocsChat`] resolves everything per call from the user id: documents,
//! credentials, provider clients and the index location. It holds no
//! per-user state besides the set of encodes currently running.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::RagConfig;
use crate::document::{Answer, Document};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerativeModel;
use crate::paths::{UserPaths, validate_user};
use crate::pipeline::{IndexingPipeline, QueryPipeline};
use crate::store::{CredentialStore, DocumentStore, FsCredentialStore, FsDocumentStore};

/// Builds provider clients for a user's API key.
pub trait ProviderFactory: Send + Sync {
    /// An embedding client authenticated with `api_key`.
    fn embedder(&self, api_key: &str) -> Result<Arc<dyn EmbeddingProvider>>;

    /// A generation client authenticated with `api_key`.
    fn generator(&self, api_key: &str) -> Result<Arc<dyn GenerativeModel>>;
}

/// Outcome of a successful [`DocsChat::encode_documents`].
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSummary {
    /// The user whose index was rebuilt.
    pub user: String,
    /// Number of documents read.
    pub documents: usize,
    /// Number of chunks embedded (and vectors stored).
    pub chunks: usize,
    /// Directory holding the new index.
    pub index_path: PathBuf,
    /// Wall time of the whole encode.
    pub elapsed: Duration,
}

/// Per-user document chat.
///
/// # Example
///
/// ```rust,ignore
/// use docschat_rag::{DocsChat, RagConfig, UserPaths};
/// use docschat_rag::openai::OpenAIProviderFactory;
///
/// let chat = DocsChat::filesystem(
///     UserPaths::new("/srv/docschat"),
///     RagConfig::default(),
///     Arc::new(OpenAIProviderFactory::new()),
/// );
/// chat.encode_documents("alice").await?;
/// let answer = chat.ask("alice", "What is in my notes?").await?;
/// ```
pub struct DocsChat {
    config: RagConfig,
    paths: UserPaths,
    documents: Arc<dyn DocumentStore>,
    credentials: Arc<dyn CredentialStore>,
    providers: Arc<dyn ProviderFactory>,
    encoding: Mutex<HashSet<String>>,
}

impl DocsChat {
    /// Create a new [`DocsChatBuilder`].
    pub fn builder() -> DocsChatBuilder {
        DocsChatBuilder::default()
    }

    /// A service reading documents and credentials from the `paths` layout.
    pub fn filesystem(
        paths: UserPaths,
        config: RagConfig,
        providers: Arc<dyn ProviderFactory>,
    ) -> Result<Self> {
        Self::builder()
            .documents(Arc::new(FsDocumentStore::new(paths.clone())))
            .credentials(Arc::new(FsCredentialStore::new(paths.clone())))
            .paths(paths)
            .config(config)
            .providers(providers)
            .build()
    }

    /// The service configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The per-user filesystem layout.
    pub fn paths(&self) -> &UserPaths {
        &self.paths
    }

    /// Rebuild `user`'s index from their current document set.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] for an invalid user id.
    /// - [`RagError::EncodeInProgress`] if an encode for `user` is already running.
    /// - [`RagError::CredentialMissing`] if the user has no API key; no
    ///   provider is contacted in that case.
    /// - [`RagError::DocumentLoadError`] for the first unreadable document.
    /// - Anything [`IndexingPipeline::run`] fails with.
    ///
    /// On every error the previously persisted index is left as it was.
    pub async fn encode_documents(&self, user: &str) -> Result<EncodeSummary> {
        validate_user(user)?;
        let _guard = EncodeGuard::acquire(&self.encoding, user)?;
        let started = Instant::now();

        let api_key = self.api_key(user).await?;
        let documents = self.read_documents(user).await?;
        let index_path = self.paths.index_dir(user)?;

        let pipeline = IndexingPipeline::builder()
            .config(self.config.clone())
            .embedding_provider(self.providers.embedder(&api_key)?)
            .build()?;
        let index = pipeline.run(user, &documents, &index_path).await?;

        Ok(EncodeSummary {
            user: user.to_string(),
            documents: documents.len(),
            chunks: index.len(),
            index_path,
            elapsed: started.elapsed(),
        })
    }

    /// Answer `question` from `user`'s index.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] for an invalid user id or an empty question.
    /// - [`RagError::CredentialMissing`] if the user has no API key.
    /// - Anything [`QueryPipeline::run`] fails with.
    pub async fn ask(&self, user: &str, question: &str) -> Result<Answer> {
        validate_user(user)?;
        if question.trim().is_empty() {
            return Err(RagError::ConfigError("question must not be empty".to_string()));
        }

        let api_key = self.api_key(user).await?;
        let index_path = self.paths.index_dir(user)?;
        let pipeline = QueryPipeline::builder()
            .config(self.config.clone())
            .embedding_provider(self.providers.embedder(&api_key)?)
            .generator(self.providers.generator(&api_key)?)
            .build()?;

        pipeline.run(user, &index_path, question).await
    }

    async fn api_key(&self, user: &str) -> Result<String> {
        match self.credentials.api_key(user).await? {
            Some(key) => Ok(key),
            None => {
                error!(user, operation = "credentials", "no API key configured");
                Err(RagError::CredentialMissing { user: user.to_string() })
            }
        }
    }

    async fn read_documents(&self, user: &str) -> Result<Vec<Document>> {
        let refs = self.documents.list(user).await?;
        if refs.is_empty() {
            warn!(user, "document set is empty, the index will have no vectors");
        }

        let mut documents = Vec::with_capacity(refs.len());
        for document in &refs {
            let loaded = self.documents.read(document).await.inspect_err(|e| {
                error!(
                    user,
                    operation = "load",
                    filename = %document.filename,
                    error = %e,
                    "document load failed"
                )
            })?;
            documents.push(loaded);
        }
        info!(user, documents = documents.len(), "loaded documents");
        Ok(documents)
    }
}

/// Marks an encode as running until dropped.
struct EncodeGuard<'a> {
    encoding: &'a Mutex<HashSet<String>>,
    user: String,
}

impl<'a> EncodeGuard<'a> {
    fn acquire(encoding: &'a Mutex<HashSet<String>>, user: &str) -> Result<Self> {
        let mut running = encoding.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(user.to_string()) {
            warn!(user, "encode already in progress");
            return Err(RagError::EncodeInProgress { user: user.to_string() });
        }
        Ok(Self { encoding, user: user.to_string() })
    }
}

impl Drop for EncodeGuard<'_> {
    fn drop(&mut self) {
        self.encoding.lock().unwrap_or_else(|e| e.into_inner()).remove(&self.user);
    }
}

/// Builder for constructing a [`DocsChat`].
///
/// `paths`, `documents`, `credentials` and `providers` are required; `config`
/// defaults to [`RagConfig::default`].
#[derive(Default)]
pub struct DocsChatBuilder {
    config: Option<RagConfig>,
    paths: Option<UserPaths>,
    documents: Option<Arc<dyn DocumentStore>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    providers: Option<Arc<dyn ProviderFactory>>,
}

impl DocsChatBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the per-user layout (used for index locations).
    pub fn paths(mut self, paths: UserPaths) -> Self {
        self.paths = Some(paths);
        self
    }

    /// Set the document store.
    pub fn documents(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    /// Set the credential store.
    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the provider factory.
    pub fn providers(mut self, providers: Arc<dyn ProviderFactory>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Build the [`DocsChat`], validating the configuration.
    pub fn build(self) -> Result<DocsChat> {
        let missing = |field: &str| RagError::ConfigError(format!("{field} is required"));
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(DocsChat {
            config,
            paths: self.paths.ok_or_else(|| missing("paths"))?,
            documents: self.documents.ok_or_else(|| missing("documents"))?,
            credentials: self.credentials.ok_or_else(|| missing("credentials"))?,
            providers: self.providers.ok_or_else(|| missing("providers"))?,
            encoding: Mutex::new(HashSet::new()),
        })
    }
}
