//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::DeployerError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Fail unless the directory exists
    pub async fn require(&self) -> Result<(), DeployerError> {
        if self.exists().await {
            Ok(())
        } else {
            Err(DeployerError::ConfigError(format!(
                "Directory does not exist: {}",
                self.path.display()
            )))
        }
    }

    /// Create the directory and its parents
    pub async fn create(&self) -> Result<(), DeployerError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// A file directly inside this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }
}
