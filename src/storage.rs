use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Persistence seam for uploaded files. Keys are bare storage names
/// (`{uuid}{ext}`); the implementation decides where they live.
#[async_trait]
pub trait FileStore: Send + Sync + 'static {
    async fn save(&self, name: &str, bytes: Vec<u8>) -> Result<()>;

    /// Removing a file that does not exist is not an error.
    async fn delete(&self, name: &str) -> Result<()>;
}

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create uploads dir {}", self.root.display()))?;
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        // Storage names are generated server-side, but never follow a
        // client-controlled path segment out of the root.
        let candidate = Path::new(name);
        if candidate.components().count() != 1 || name.contains("..") {
            anyhow::bail!("invalid storage name: {name}");
        }
        Ok(self.root.join(candidate))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
        }
    }
}
