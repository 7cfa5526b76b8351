pub mod local;
pub mod object_store;

use std::path::{Path, PathBuf};

use crate::config::{StorageConfig, StorageStrategy};
use local::LocalDiskSink;
use object_store::ObjectStoreSink;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to write upload {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Object store error: {0}")]
    ObjectStore(String),
}

#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub key: String,
    pub url: String,
}

/// Where accepted uploads are persisted for later display.
#[derive(Clone)]
pub enum UploadSink {
    Local(LocalDiskSink),
    ObjectStore(ObjectStoreSink),
}

impl UploadSink {
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        match config.strategy {
            StorageStrategy::Local => Ok(UploadSink::Local(
                LocalDiskSink::new(config.upload_dir.clone()).await?,
            )),
            StorageStrategy::ObjectStore => Ok(UploadSink::ObjectStore(
                ObjectStoreSink::from_config(config).await?,
            )),
        }
    }

    /// Local directory to serve under `/static/uploads`, if any.
    pub fn local_dir(&self) -> Option<&Path> {
        match self {
            UploadSink::Local(sink) => Some(sink.upload_dir()),
            UploadSink::ObjectStore(_) => None,
        }
    }

    pub async fn store(
        &self,
        source: &Path,
        original_name: Option<&str>,
        file_extension: &str,
        content_type: &str,
    ) -> Result<StoredUpload, StorageError> {
        match self {
            UploadSink::Local(sink) => sink.store(source, original_name, file_extension).await,
            UploadSink::ObjectStore(sink) => {
                sink.store(source, file_extension, content_type).await
            }
        }
    }

    pub async fn remove(&self, stored: &StoredUpload) -> Result<(), StorageError> {
        match self {
            UploadSink::Local(sink) => sink.remove(&stored.key).await,
            UploadSink::ObjectStore(sink) => sink.remove(&stored.key).await,
        }
    }
}
