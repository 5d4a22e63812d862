//! Local-filesystem passthrough backend.
//!
//! Mirrors objects under a root directory instead of a bucket. Writes
//! bypass the chunking writer entirely: `create` hands back the file
//! itself as the sink. Used for local mode and as the test double for
//! the remote backend.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::storage::backend::{
    file_name, CreateOptions, FileInfo, FileStorage, ObjectReader, ObjectSink,
};
use crate::storage::error::{Result, StorageError};

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StorageError::LocalIo {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Remote keys start with a separator; joining them raw onto the
    /// root would escape it.
    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn create(&self, path: &str, _opts: CreateOptions) -> Result<Box<dyn ObjectSink>> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::LocalIo {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let file = File::create(&full)
            .await
            .map_err(|source| StorageError::LocalIo {
                path: full.clone(),
                source,
            })?;
        Ok(Box::new(LocalSink { file, path: full }))
    }

    async fn get(&self, path: &str) -> Result<ObjectReader> {
        let full = self.resolve(path);
        let file = File::open(&full).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    key: path.to_string(),
                }
            } else {
                StorageError::LocalIo { path: full.clone(), source }
            }
        })?;
        Ok(Box::new(file))
    }

    async fn stat(&self, path: &str) -> Result<FileInfo> {
        let full = self.resolve(path);
        let meta = tokio::fs::metadata(&full).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    key: path.to_string(),
                }
            } else {
                StorageError::LocalIo { path: full.clone(), source }
            }
        })?;
        Ok(FileInfo {
            path: path.to_string(),
            file_name: file_name(path).to_string(),
            size: meta.len(),
        })
    }
}

struct LocalSink {
    file: File,
    path: PathBuf,
}

impl LocalSink {
    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::LocalIo {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl ObjectSink for LocalSink {
    async fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        self.file
            .write_all(bytes)
            .await
            .map_err(|e| self.io_err(e))?;
        Ok(bytes.len())
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.file.flush().await.map_err(|e| self.io_err(e))?;
        Ok(())
    }
}
