//! Blob storage for artifact bytes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// Something is already stored at the path. Paths are version-qualified,
    /// so this means another writer took the version.
    #[error("blob already exists at {0}")]
    AlreadyExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write-once blob storage addressed by relative path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path` and return the public URL. Never overwrites:
    /// an occupied path yields [`BlobError::AlreadyExists`].
    async fn put_new(&self, path: &str, bytes: &[u8], mime_type: &str) -> Result<String, BlobError>;

    /// Remove the blob at `path`. Removing a missing blob is not an error.
    async fn delete(&self, path: &str) -> Result<(), BlobError>;
}

/// [`BlobStore`] on the local filesystem.
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put_new(&self, path: &str, bytes: &[u8], _mime_type: &str) -> Result<String, BlobError> {
        let full = self.full_path(path);
        if let Some(dir) = full.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(BlobError::AlreadyExists(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let written = async {
            file.write_all(bytes).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            // A half-written file would block this version forever.
            let _ = tokio::fs::remove_file(&full).await;
            return Err(e.into());
        }

        Ok(format!("{}/{path}", self.public_base_url))
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        match tokio::fs::remove_file(self.full_path(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
