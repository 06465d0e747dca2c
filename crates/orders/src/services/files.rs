//! Storage of uploaded image files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::config::UploadConfig;

/// Errors from file storage.
#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("file io error: {0}")]
    Io(#[from] std::io::Error),
    /// The url does not point into this store.
    #[error("url is not managed by this store: {0}")]
    ForeignUrl(String),
}

/// Stores uploaded files and serves them under a public url.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store `bytes` and return the public url. `extension` is lowercase
    /// and has no leading dot.
    async fn save(&self, extension: &str, bytes: &[u8]) -> Result<String, FileStoreError>;

    /// Delete the file behind `url`. Deleting a missing file succeeds.
    async fn delete(&self, url: &str) -> Result<(), FileStoreError>;
}

/// Writes files into a local directory under random names.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    dir: PathBuf,
    url_prefix: String,
}

impl LocalFileStore {
    /// Create a store writing into `dir`, served under `url_prefix`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.dir.clone(), config.url_prefix.clone())
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file name behind a url of this store.
    fn file_name<'a>(&self, url: &'a str) -> Result<&'a str, FileStoreError> {
        url.strip_prefix(self.url_prefix.as_str())
            .filter(|name| {
                !name.is_empty() && !name.contains('/') && !name.contains('\\') && !name.starts_with('.')
            })
            .ok_or_else(|| FileStoreError::ForeignUrl(url.to_owned()))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, extension: &str, bytes: &[u8]) -> Result<String, FileStoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let name = format!("{}.{extension}", Uuid::new_v4());
        tokio::fs::write(self.dir.join(&name), bytes).await?;

        tracing::debug!(file = %name, size = bytes.len(), "Stored upload");
        Ok(format!("{}{name}", self.url_prefix))
    }

    async fn delete(&self, url: &str) -> Result<(), FileStoreError> {
        let name = self.file_name(url)?;
        match tokio::fs::remove_file(self.dir.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
