//! Blob-storage collaborator
//!
//! Avatar and photo uploads live entirely outside the core; the services
//! only ever see the public URL that comes back.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::shared::{CoreError, Result};

/// External blob store: takes file bytes, returns a public URL
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, filename: &str, bytes: Vec<u8>) -> Result<String>;
}

/// Disk-backed store under the data directory, for single-node deployments
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, filename: &str, bytes: Vec<u8>) -> Result<String> {
        // Strip any path components a client may have smuggled in
        let name = filename
            .rsplit(['/', '\\'])
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CoreError::InvalidArgument("empty filename".into()))?;

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(name);
        tokio::fs::write(&path, bytes).await?;
        debug!(?path, "stored blob");
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn stores_under_the_bare_filename() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf());

        let url = store
            .store("../../etc/avatar.png", vec![1, 2, 3])
            .await
            .unwrap();
        assert!(url.ends_with("avatar.png"));
        assert!(dir.path().join("avatar.png").exists());
    }

    #[tokio::test]
    async fn rejects_an_empty_filename() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf());
        assert!(store.store("", vec![1]).await.is_err());
    }
}
