//! Per-user filesystem layout.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{RagError, Result};

const DATA_DIR: &str = "data";
const INDEX_DIR: &str = "index";
const ENV_DIR: &str = "env";

/// Resolves where a user's documents, index and credentials live under `root`.
///
/// ```text
/// <root>/data/<user>/      uploaded documents
/// <root>/index/<user>/     index.json
/// <root>/env/<user>.env    OPENAI_API_KEY=...
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPaths {
    root: PathBuf,
}

impl UserPaths {
    /// Create a layout rooted at `root`. Nothing is touched on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the `data`, `index` and `env` base folders if they are missing.
    pub fn initialize(&self) -> Result<()> {
        for dir in [DATA_DIR, INDEX_DIR, ENV_DIR] {
            let path = self.root.join(dir);
            std::fs::create_dir_all(&path)
                .map_err(|source| RagError::StorageError { path: path.clone(), source })?;
            debug!(path = %path.display(), "ensured base folder");
        }
        Ok(())
    }

    /// Folder holding `user`'s documents.
    pub fn documents_dir(&self, user: &str) -> Result<PathBuf> {
        validate_user(user)?;
        Ok(self.root.join(DATA_DIR).join(user))
    }

    /// Folder holding `user`'s persisted index.
    pub fn index_dir(&self, user: &str) -> Result<PathBuf> {
        validate_user(user)?;
        Ok(self.root.join(INDEX_DIR).join(user))
    }

    /// `user`'s credentials file.
    pub fn env_file(&self, user: &str) -> Result<PathBuf> {
        validate_user(user)?;
        Ok(self.root.join(ENV_DIR).join(format!("{user}.env")))
    }
}

/// Check that `user` is safe to use as a single path component.
///
/// Accepts ASCII alphanumerics plus `-`, `_` and `.`, not starting with `.`.
pub fn validate_user(user: &str) -> Result<()> {
    if user.is_empty() {
        return Err(RagError::ConfigError("user id must not be empty".to_string()));
    }
    if user.starts_with('.') {
        return Err(RagError::ConfigError(format!("user id '{user}' must not start with '.'")));
    }
    let allowed = |c: &char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if let Some(c) = user.chars().find(|c| !allowed(c)) {
        return Err(RagError::ConfigError(format!(
            "user id '{user}' contains invalid character {c:?}"
        )));
    }
    Ok(())
}
