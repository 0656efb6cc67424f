use crate::keys::validate_key;
use crate::traits::{ObjectMetadata, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Local filesystem storage implementation
///
/// Writes land in a `.partial` sibling first and are renamed into place after
/// a sync, so readers never observe a half-written object.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: Option<String>,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/stowage/uploads")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:3000/uploads")
    pub async fn new(
        base_path: impl Into<PathBuf>,
        base_url: Option<String>,
    ) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let base_path = base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Besides the lexical key rules, an existing path must not resolve
    /// (through symlinks) outside the base directory.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        let key = validate_key(key)?;
        let path = self.base_path.join(&key);

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&self.base_path).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn partial_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.partial", Uuid::new_v4().simple()));
        path.with_file_name(name)
    }

    /// Sync the partial file and move it over the final path.
    async fn commit(&self, mut file: fs::File, partial: &Path, path: &Path) -> StorageResult<()> {
        let synced = file.flush().await.and(file.sync_all().await);
        drop(file);
        if let Err(e) = synced {
            let _ = fs::remove_file(partial).await;
            return Err(StorageError::WriteFailed(format!(
                "Failed to sync file {}: {}",
                path.display(),
                e
            )));
        }

        fs::rename(partial, path).await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to move {} into place: {}",
                path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn absolute_path(&self, key: &str) -> StorageResult<PathBuf> {
        self.key_to_path(key)
    }

    fn public_url(&self, key: &str) -> Option<String> {
        let key = validate_key(key).ok()?;
        self.base_url
            .as_ref()
            .map(|base| format!("{}/{}", base, key))
    }

    async fn write(&self, key: &str, data: Bytes) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        let partial = Self::partial_path(&path);
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        self.ensure_parent_dir(&path).await?;

        let mut file = fs::File::create(&partial).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        if let Err(e) = file.write_all(&data).await {
            drop(file);
            let _ = fs::remove_file(&partial).await;
            return Err(StorageError::WriteFailed(format!(
                "Failed to write file {}: {}",
                path.display(),
                e
            )));
        }

        self.commit(file, &partial, &path).await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(size)
    }

    async fn write_stream(
        &self,
        key: &str,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    ) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        let partial = Self::partial_path(&path);
        let start = std::time::Instant::now();

        self.ensure_parent_dir(&path).await?;

        let mut file = fs::File::create(&partial).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        let bytes_copied = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&partial).await;
                return Err(StorageError::WriteFailed(format!(
                    "Failed to write stream to file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        self.commit(file, &partial, &path).await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = bytes_copied,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage stream write successful"
        );

        Ok(bytes_copied)
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            StorageError::ReadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage read successful"
        );

        Ok(Bytes::from(data))
    }

    async fn read_prefix(&self, key: &str, len: usize) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => {
                return Err(StorageError::ReadFailed(format!(
                    "Failed to open file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut data = Vec::with_capacity(len);
        file.take(len as u64)
            .read_to_end(&mut data)
            .await
            .map_err(|e| {
                StorageError::ReadFailed(format!("Failed to read file {}: {}", path.display(), e))
            })?;
        Ok(Bytes::from(data))
    }

    async fn metadata(&self, key: &str) -> StorageResult<ObjectMetadata> {
        let path = self.key_to_path(key)?;
        let meta = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(StorageError::NotFound(key.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => return Err(StorageError::BackendError(e.to_string())),
        };

        Ok(ObjectMetadata {
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn storage(dir: &Path) -> LocalStorage {
        LocalStorage::new(dir, Some("http://localhost:3000/uploads/".to_string()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_local_storage_write_read() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let written = storage
            .write("images/test.txt", Bytes::from_static(b"test data"))
            .await
            .unwrap();
        assert_eq!(written, 9);

        let data = storage.read("images/test.txt").await.unwrap();
        assert_eq!(data.as_ref(), b"test data");

        let meta = storage.metadata("images/test.txt").await.unwrap();
        assert_eq!(meta.size, 9);
        assert!(meta.modified.is_some());
    }

    #[tokio::test]
    async fn test_read_prefix_is_bounded() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        storage
            .write("big.bin", Bytes::from(vec![7u8; 10_000]))
            .await
            .unwrap();

        assert_eq!(storage.read_prefix("big.bin", 16).await.unwrap().len(), 16);
        assert_eq!(storage.read_prefix("big.bin", 20_000).await.unwrap().len(), 10_000);
        assert!(matches!(
            storage.read_prefix("missing.bin", 16).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_write_leaves_no_partial_files() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        storage.write("a.txt", Bytes::from_static(b"one")).await.unwrap();
        storage.write("a.txt", Bytes::from_static(b"two")).await.unwrap();

        let mut entries = std::fs::read_dir(storage.base_path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        entries.sort();
        assert_eq!(entries, vec!["a.txt"]);
        assert_eq!(storage.read("a.txt").await.unwrap().as_ref(), b"two");
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let result = storage.read("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete("../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_local_storage_delete_nonexistent() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let result = storage.delete("nonexistent/file.txt").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_local_storage_missing_file() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        assert!(!storage.exists("missing.txt").await.unwrap());
        assert!(matches!(
            storage.read("missing.txt").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.metadata("missing.txt").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_storage_stream_write() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let data = b"stream test data".to_vec();
        let cursor = std::io::Cursor::new(data.clone());
        let reader = Box::pin(cursor) as Pin<Box<dyn AsyncRead + Send + Unpin>>;

        let written = storage.write_stream("stream.txt", reader).await.unwrap();
        assert_eq!(written, data.len() as u64);

        let read = storage.read("stream.txt").await.unwrap();
        assert_eq!(read.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_public_url_and_absolute_path() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        assert_eq!(
            storage.public_url("images\\a.jpg").as_deref(),
            Some("http://localhost:3000/uploads/images/a.jpg")
        );
        assert_eq!(storage.public_url("../a.jpg"), None);

        let path = storage.absolute_path("images/a.jpg").unwrap();
        assert!(path.starts_with(storage.base_path()));

        let private = LocalStorage::new(dir.path(), None).await.unwrap();
        assert_eq!(private.public_url("a.jpg"), None);
    }
}
