use crate::keys::validate_key;
use crate::traits::{ObjectMetadata, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    modified: DateTime<Utc>,
}

/// In-memory storage, for tests and ephemeral stores.
///
/// Clones share the same objects.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    name: String,
    objects: Arc<RwLock<HashMap<String, Entry>>>,
    base_url: Option<String>,
}

impl MemoryStorage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    /// Keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }

    /// Pseudo path `memory://{name}/{key}`; nothing exists on disk.
    fn absolute_path(&self, key: &str) -> StorageResult<PathBuf> {
        let key = validate_key(key)?;
        Ok(PathBuf::from(format!("memory://{}/{}", self.name, key)))
    }

    fn public_url(&self, key: &str) -> Option<String> {
        let key = validate_key(key).ok()?;
        self.base_url
            .as_ref()
            .map(|base| format!("{}/{}", base, key))
    }

    async fn write(&self, key: &str, data: Bytes) -> StorageResult<u64> {
        let key = validate_key(key)?;
        let size = data.len() as u64;
        self.objects.write().await.insert(
            key.clone(),
            Entry {
                data,
                modified: Utc::now(),
            },
        );

        tracing::debug!(store = %self.name, key = %key, size_bytes = size, "Memory storage write");
        Ok(size)
    }

    async fn write_stream(
        &self,
        key: &str,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    ) -> StorageResult<u64> {
        validate_key(key)?;
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("Failed to read stream: {}", e)))?;
        self.write(key, Bytes::from(buffer)).await
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let key = validate_key(key)?;
        self.objects
            .read()
            .await
            .get(&key)
            .map(|entry| entry.data.clone())
            .ok_or(StorageError::NotFound(key))
    }

    async fn metadata(&self, key: &str) -> StorageResult<ObjectMetadata> {
        let key = validate_key(key)?;
        self.objects
            .read()
            .await
            .get(&key)
            .map(|entry| ObjectMetadata {
                size: entry.data.len() as u64,
                modified: Some(entry.modified),
            })
            .ok_or(StorageError::NotFound(key))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let key = validate_key(key)?;
        Ok(self.objects.read().await.contains_key(&key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let key = validate_key(key)?;
        self.objects.write().await.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new("uploads").with_base_url("http://cdn/uploads/");

        storage
            .write("images/a.txt", Bytes::from_static(b"abc"))
            .await
            .unwrap();

        assert!(storage.exists("images\\a.txt").await.unwrap());
        assert_eq!(storage.read("images/a.txt").await.unwrap().as_ref(), b"abc");
        assert_eq!(storage.metadata("images/a.txt").await.unwrap().size, 3);
        assert_eq!(
            storage.public_url("images/a.txt").as_deref(),
            Some("http://cdn/uploads/images/a.txt")
        );
        assert_eq!(storage.keys().await, vec!["images/a.txt"]);
        assert_eq!(storage.read_prefix("images/a.txt", 2).await.unwrap().as_ref(), b"ab");

        storage.delete("images/a.txt").await.unwrap();
        assert!(!storage.exists("images/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_objects() {
        let storage = MemoryStorage::new("uploads");
        let clone = storage.clone();
        storage.write("a", Bytes::from_static(b"1")).await.unwrap();
        assert!(clone.exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_storage_rejects_unsafe_keys() {
        let storage = MemoryStorage::new("uploads");
        let result = storage.write("../x", Bytes::new()).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        assert!(matches!(
            storage.read("missing").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
