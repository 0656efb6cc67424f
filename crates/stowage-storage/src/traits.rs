//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::pin::Pin;
use stowage_core::FileError;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("No store mounted for scheme '{0}'")]
    UnknownScheme(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for FileError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => FileError::NotFound(key),
            StorageError::InvalidKey(msg) => FileError::InvalidUri(msg),
            StorageError::UnknownScheme(scheme) => {
                FileError::Configuration(format!("no store mounted for scheme '{}'", scheme))
            }
            StorageError::ConfigError(msg) => FileError::Configuration(msg),
            StorageError::IoError(e) => FileError::Io(e),
            other => FileError::Storage(other.to_string()),
        }
    }
}

/// Size and modification time of a stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMetadata {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Storage abstraction trait
///
/// All storage backends (local filesystem, memory) implement this trait so the
/// pipeline never couples to a specific backend. Every method takes a
/// store-relative key; implementations must validate it with
/// [`crate::keys::validate_key`] before touching anything.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Resolve a key to the absolute location of the object.
    fn absolute_path(&self, key: &str) -> StorageResult<PathBuf>;

    /// Publicly reachable URL for a key, when the store is exposed.
    fn public_url(&self, key: &str) -> Option<String>;

    /// Write `data` at `key`, replacing any existing object. Returns bytes written.
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<u64>;

    /// Write from a reader until EOF. Returns bytes written.
    async fn write_stream(
        &self,
        key: &str,
        reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    ) -> StorageResult<u64>;

    /// Read the whole object at `key`.
    async fn read(&self, key: &str) -> StorageResult<Bytes>;

    /// Read at most `len` bytes from the start of the object at `key`.
    async fn read_prefix(&self, key: &str, len: usize) -> StorageResult<Bytes> {
        let data = self.read(key).await?;
        Ok(data.slice(..data.len().min(len)))
    }

    async fn metadata(&self, key: &str) -> StorageResult<ObjectMetadata>;

    /// Check if an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::{ErrorKind, ErrorMetadata};

    #[test]
    fn test_storage_error_maps_to_file_error() {
        let err: FileError = StorageError::NotFound("a.txt".to_string()).into();
        assert!(matches!(err, FileError::NotFound(_)));

        let err: FileError = StorageError::InvalidKey("../x".to_string()).into();
        assert_eq!(err.error_kind(), ErrorKind::Addressing);

        let err: FileError = StorageError::UnknownScheme("cdn".to_string()).into();
        assert_eq!(err.error_kind(), ErrorKind::Configuration);

        let err: FileError = StorageError::WriteFailed("disk full".to_string()).into();
        assert_eq!(err.error_kind(), ErrorKind::Storage);
        assert!(err.to_string().contains("disk full"));
    }
}
