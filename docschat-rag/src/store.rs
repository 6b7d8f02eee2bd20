//! Document and credential stores.
//!
//! This crate only ever reads from these; uploading, deleting and editing files
//! is left to the host application.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::document::Document;
use crate::error::{RagError, Result};
use crate::paths::UserPaths;

/// Environment key holding a user's provider API key.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// File extensions [`FsDocumentStore`] picks up.
#[cfg(feature = "pdf")]
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "markdown"];
/// File extensions [`FsDocumentStore`] picks up.
#[cfg(not(feature = "pdf"))]
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// A handle to one of a user's documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DocumentRef {
    /// Owner of the document.
    pub user: String,
    /// Filename within the user's document set.
    pub filename: String,
}

impl DocumentRef {
    /// Create a handle.
    pub fn new(user: impl Into<String>, filename: impl Into<String>) -> Self {
        Self { user: user.into(), filename: filename.into() }
    }
}

/// Read access to per-user document sets.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List `user`'s documents, sorted by filename.
    ///
    /// # Errors
    ///
    /// [`RagError::DocumentLoadError`] for a document that cannot be named.
    async fn list(&self, user: &str) -> Result<Vec<DocumentRef>>;

    /// Read and decode a document.
    ///
    /// # Errors
    ///
    /// [`RagError::DocumentLoadError`] naming the file on any failure.
    async fn read(&self, document: &DocumentRef) -> Result<Document>;
}

/// Read access to per-user provider credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The user's API key, or `None` if none is configured.
    async fn api_key(&self, user: &str) -> Result<Option<String>>;
}

/// Documents stored as files under `<root>/data/<user>/`.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    paths: UserPaths,
}

impl FsDocumentStore {
    /// Create a store over the given layout.
    pub fn new(paths: UserPaths) -> Self {
        Self { paths }
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(ext)))
}

fn load_error(filename: &str, message: impl ToString) -> RagError {
    RagError::DocumentLoadError { filename: filename.to_string(), message: message.to_string() }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn list(&self, user: &str) -> Result<Vec<DocumentRef>> {
        let dir = self.paths.documents_dir(user)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(RagError::StorageError { path: dir, source }),
        };

        let mut documents = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => return Err(RagError::StorageError { path: dir, source }),
            };
            let path = entry.path();
            if !path.is_file() || !is_supported(&path) {
                continue;
            }
            let filename = entry.file_name().into_string().map_err(|name| {
                warn!(user, ?name, "document name is not valid UTF-8");
                load_error(&name.to_string_lossy(), "filename is not valid UTF-8")
            })?;
            documents.push(DocumentRef::new(user, filename));
        }
        documents.sort();
        debug!(user, count = documents.len(), "listed documents");
        Ok(documents)
    }

    async fn read(&self, document: &DocumentRef) -> Result<Document> {
        let filename = document.filename.as_str();
        if filename.contains(['/', '\\']) || filename.starts_with('.') {
            return Err(load_error(filename, "invalid filename"));
        }
        let path = self.paths.documents_dir(&document.user)?.join(filename);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let text = match extension.as_str() {
            #[cfg(feature = "pdf")]
            "pdf" => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
                    .await
                    .map_err(|e| load_error(filename, e))?
                    .map_err(|e| load_error(filename, e))?
            }
            "txt" | "md" | "markdown" => {
                tokio::fs::read_to_string(&path).await.map_err(|e| load_error(filename, e))?
            }
            other => return Err(load_error(filename, format!("unsupported file type '{other}'"))),
        };

        debug!(user = %document.user, filename, chars = text.chars().count(), "read document");
        Ok(Document::new(filename, text))
    }
}

/// In-memory document sets, for tests and hosts that keep documents elsewhere.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    users: RwLock<HashMap<String, BTreeMap<String, std::result::Result<String, String>>>>,
}

impl InMemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a document.
    pub fn insert(&self, user: &str, filename: &str, text: impl Into<String>) {
        self.put(user, filename, Ok(text.into()));
    }

    /// Add a document whose reads fail with `message`.
    pub fn insert_unreadable(&self, user: &str, filename: &str, message: impl Into<String>) {
        self.put(user, filename, Err(message.into()));
    }

    /// Remove a document. Returns whether it existed.
    pub fn remove(&self, user: &str, filename: &str) -> bool {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        users.get_mut(user).is_some_and(|docs| docs.remove(filename).is_some())
    }

    fn put(&self, user: &str, filename: &str, content: std::result::Result<String, String>) {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        users.entry(user.to_string()).or_default().insert(filename.to_string(), content);
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn list(&self, user: &str) -> Result<Vec<DocumentRef>> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        Ok(users
            .get(user)
            .map(|docs| docs.keys().map(|name| DocumentRef::new(user, name.as_str())).collect())
            .unwrap_or_default())
    }

    async fn read(&self, document: &DocumentRef) -> Result<Document> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        match users.get(&document.user).and_then(|docs| docs.get(&document.filename)) {
            Some(Ok(text)) => Ok(Document::new(document.filename.as_str(), text.as_str())),
            Some(Err(message)) => Err(load_error(&document.filename, message)),
            None => Err(load_error(&document.filename, "no such document")),
        }
    }
}

/// Credentials read from `<root>/env/<user>.env`.
///
/// The file is parsed in isolation; the process environment is never read
/// or modified.
#[derive(Debug, Clone)]
pub struct FsCredentialStore {
    paths: UserPaths,
}

impl FsCredentialStore {
    /// Create a store over the given layout.
    pub fn new(paths: UserPaths) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl CredentialStore for FsCredentialStore {
    async fn api_key(&self, user: &str) -> Result<Option<String>> {
        let path = self.paths.env_file(user)?;
        let iter = match dotenvy::from_path_iter(&path) {
            Ok(iter) => iter,
            Err(e) if e.not_found() => return Ok(None),
            Err(e) => {
                return Err(RagError::ConfigError(format!(
                    "cannot read credentials {}: {e}",
                    path.display()
                )));
            }
        };

        for item in iter {
            let (key, value) = item.map_err(|e| {
                RagError::ConfigError(format!("malformed credentials {}: {e}", path.display()))
            })?;
            if key == API_KEY_VAR {
                let value = value.trim();
                return Ok((!value.is_empty()).then(|| value.to_string()));
            }
        }
        Ok(None)
    }
}

/// Fixed per-user API keys.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    keys: RwLock<HashMap<String, String>>,
}

impl InMemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `user`'s API key.
    pub fn set(&self, user: &str, api_key: impl Into<String>) {
        self.keys.write().unwrap_or_else(|e| e.into_inner()).insert(user.to_string(), api_key.into());
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn api_key(&self, user: &str) -> Result<Option<String>> {
        Ok(self.keys.read().unwrap_or_else(|e| e.into_inner()).get(user).cloned())
    }
}
