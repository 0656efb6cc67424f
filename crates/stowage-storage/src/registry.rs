//! Scheme to store mapping
//!
//! The pipeline addresses files by URI (`uploads://images/photo.jpg`); the
//! registry resolves the scheme to a mounted [`Storage`] and the rest of the
//! URI to a validated key.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use stowage_core::constants::SNIFF_WINDOW;
use stowage_core::mime;
use stowage_core::{FileResult, FileStats, FileUri, IntoFileUri};

use crate::keys::validate_key;
use crate::traits::{Storage, StorageError, StorageResult};

#[derive(Clone, Default)]
pub struct StorageRegistry {
    stores: BTreeMap<String, Arc<dyn Storage>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `storage` under `scheme` (case-folded). A scheme can only be
    /// mounted once.
    pub fn mount(&mut self, scheme: &str, storage: Arc<dyn Storage>) -> StorageResult<()> {
        let scheme = scheme.trim().to_ascii_lowercase();
        if scheme.is_empty() {
            return Err(StorageError::ConfigError(
                "cannot mount a store under an empty scheme".to_string(),
            ));
        }
        if self.stores.contains_key(&scheme) {
            return Err(StorageError::ConfigError(format!(
                "scheme '{}' is already mounted",
                scheme
            )));
        }

        tracing::debug!(scheme = %scheme, backend = %storage.backend_type(), "Mounted store");
        self.stores.insert(scheme, storage);
        Ok(())
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.stores.contains_key(&scheme.trim().to_ascii_lowercase())
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    pub fn store(&self, scheme: &str) -> StorageResult<&Arc<dyn Storage>> {
        let scheme = scheme.trim().to_ascii_lowercase();
        self.stores
            .get(&scheme)
            .ok_or(StorageError::UnknownScheme(scheme))
    }

    /// Parse `uri`, check its store is mounted and its key is safe.
    pub fn normalize_uri(&self, uri: impl IntoFileUri) -> FileResult<FileUri> {
        let uri = uri.into_file_uri()?;
        self.store(uri.store())?;
        validate_key(&uri.key())?;
        Ok(uri)
    }

    /// Trusted facts about a stored file: size from the backend, media type
    /// sniffed from content (falling back to the extension table), binary flag.
    ///
    /// Only the head of the object is read. One byte past the sniff window
    /// tells a multi-byte sequence cut by the window from a truncated file.
    pub async fn stats(&self, uri: &FileUri) -> FileResult<FileStats> {
        let store = self.store(uri.store())?;
        let key = validate_key(&uri.key())?;
        let meta = store.metadata(&key).await?;
        let data = store.read_prefix(&key, SNIFF_WINDOW + 1).await?;

        let extension = uri.extension().map(str::to_string);
        let mime = mime::sniff(&data)
            .or_else(|| extension.as_deref().and_then(mime::for_extension))
            .unwrap_or(stowage_core::constants::OCTET_STREAM)
            .to_string();

        Ok(FileStats {
            name: uri.stem().to_string(),
            extension,
            path: key,
            mime,
            size: meta.size,
            binary: mime::is_binary(&data),
            modified: meta.modified,
        })
    }

    pub fn absolute_path(&self, uri: &FileUri) -> FileResult<PathBuf> {
        Ok(self.store(uri.store())?.absolute_path(&uri.key())?)
    }

    pub fn public_url(&self, uri: &FileUri) -> Option<String> {
        self.store(uri.store()).ok()?.public_url(&uri.key())
    }

    pub async fn write(&self, uri: &FileUri, data: Bytes) -> FileResult<u64> {
        Ok(self.store(uri.store())?.write(&uri.key(), data).await?)
    }

    pub async fn read(&self, uri: &FileUri) -> FileResult<Bytes> {
        Ok(self.store(uri.store())?.read(&uri.key()).await?)
    }

    pub async fn exists(&self, uri: &FileUri) -> FileResult<bool> {
        Ok(self.store(uri.store())?.exists(&uri.key()).await?)
    }

    pub async fn delete(&self, uri: &FileUri) -> FileResult<()> {
        Ok(self.store(uri.store())?.delete(&uri.key()).await?)
    }
}

impl std::fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.stores
                    .iter()
                    .map(|(scheme, store)| (scheme, store.backend_type())),
            )
            .finish()
    }
}
