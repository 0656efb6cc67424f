#[cfg(feature = "storage-local")]
use crate::LocalStorage;
use crate::{MemoryStorage, Storage, StorageBackend, StorageRegistry, StorageResult};
#[cfg(not(feature = "storage-local"))]
use crate::StorageError;
use std::sync::Arc;
use stowage_core::Config;

/// Create a storage registry based on configuration
///
/// One store is mounted per configured scheme. Local stores live in a
/// subdirectory named after the scheme and are served under
/// `{LOCAL_STORAGE_BASE_URL}/{scheme}`.
pub async fn create_storage(config: &Config) -> StorageResult<StorageRegistry> {
    let mut registry = StorageRegistry::new();

    for scheme in &config.storage.schemes {
        let base_url = config
            .storage
            .local_storage_base_url
            .as_ref()
            .map(|base| format!("{}/{}", base, scheme));

        let storage: Arc<dyn Storage> = match config.storage.backend {
            #[cfg(feature = "storage-local")]
            StorageBackend::Local => {
                let root = std::path::Path::new(&config.storage.local_storage_path).join(scheme);
                Arc::new(LocalStorage::new(root, base_url).await?)
            }

            #[cfg(not(feature = "storage-local"))]
            StorageBackend::Local => {
                return Err(StorageError::ConfigError(
                    "Local storage backend not available (storage-local feature not enabled)"
                        .to_string(),
                ));
            }

            StorageBackend::Memory => {
                let store = MemoryStorage::new(scheme.as_str());
                Arc::new(match base_url {
                    Some(url) => store.with_base_url(url),
                    None => store,
                })
            }
        };

        registry.mount(scheme, storage)?;
    }

    tracing::info!(
        backend = %config.storage.backend,
        schemes = ?config.storage.schemes,
        "Storage initialized"
    );

    Ok(registry)
}
