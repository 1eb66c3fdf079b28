//! Local archive stager.
//!
//! Writes a downloaded byte stream to the staging path chunk by chunk,
//! overwriting whatever was there, and keeps a running SHA-256 of the bytes.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::StagedArchive;
use crate::error::DeployError;

/// An open staging file receiving a download
pub struct StagingFile {
    path: PathBuf,
    file: File,
    hasher: Sha256,
    size_bytes: u64,
}

impl StagingFile {
    /// Create (or truncate) the staging file, creating parent directories
    pub async fn create(path: &Path) -> Result<Self, DeployError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DeployError::fs(parent, e))?;
            }
        }

        let file = File::create(path)
            .await
            .map_err(|e| DeployError::fs(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            hasher: Sha256::new(),
            size_bytes: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), DeployError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| DeployError::fs(&self.path, e))?;
        self.hasher.update(chunk);
        self.size_bytes += chunk.len() as u64;
        Ok(())
    }

    /// Flush to disk and describe what was staged
    pub async fn finish(mut self) -> Result<StagedArchive, DeployError> {
        self.file
            .flush()
            .await
            .map_err(|e| DeployError::fs(&self.path, e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| DeployError::fs(&self.path, e))?;

        let sha256 = hex::encode(self.hasher.finalize());
        debug!(
            path = %self.path.display(),
            size_bytes = self.size_bytes,
            %sha256,
            "Archive staged"
        );

        Ok(StagedArchive {
            path: self.path,
            size_bytes: self.size_bytes,
            sha256,
        })
    }
}

/// Stage an in-memory buffer in one go
pub async fn stage_bytes(path: &Path, bytes: &[u8]) -> Result<StagedArchive, DeployError> {
    let mut staging = StagingFile::create(path).await?;
    staging.write_chunk(bytes).await?;
    staging.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_chunks_are_concatenated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("citizen-build.zip");

        let mut staging = StagingFile::create(&path).await.unwrap();
        staging.write_chunk(b"hello ").await.unwrap();
        staging.write_chunk(b"world").await.unwrap();
        let staged = staging.finish().await.unwrap();

        assert_eq!(staged.size_bytes, 11);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello world");
        // sha256("hello world")
        assert_eq!(
            staged.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn test_existing_file_is_overwritten() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("citizen-build.zip");
        tokio::fs::write(&path, b"a much longer previous download")
            .await
            .unwrap();

        let staged = stage_bytes(&path, b"new").await.unwrap();
        assert_eq!(staged.size_bytes, 3);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_parent_directories_created() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("dir").join("x.zip");
        stage_bytes(&path, b"x").await.unwrap();
        assert!(path.exists());
    }
}
