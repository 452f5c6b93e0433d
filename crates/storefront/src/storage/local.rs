//! Local filesystem object store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use super::{Backend, ObjectStore, StorageError};

/// Objects as files under a root directory, served from a URL prefix.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for a normalised object name.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        name.split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    async fn probe(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn put(&self, name: &str, body: Bytes, _content_type: &str) -> Result<(), StorageError> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &body).await?;
        tracing::debug!(path = %path.display(), bytes = body.len(), "Wrote object to disk");
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.path_for(name)).await?)
    }

    fn url(&self, name: &str) -> String {
        format!("{}/{name}", self.url_prefix)
    }
}
