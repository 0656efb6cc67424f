//! Test helpers: a Filer and Variator over an in-memory `uploads` store.
//!
//! Run from workspace root: `cargo test -p stowage-pipeline`.

#![allow(dead_code)]

pub mod fixtures;

use std::collections::HashMap;
use std::sync::Arc;
use stowage_core::Config;
use stowage_pipeline::{builtin_catalog, Filer, Hydrator, PolicyCatalog, Policy, Variator};
use stowage_storage::{MemoryStorage, StorageRegistry};

pub const SCHEME: &str = "uploads";

pub struct TestApp {
    pub filer: Filer,
    pub variator: Variator,
    pub storage: Arc<StorageRegistry>,
    /// The store mounted under `uploads`, for inspecting what was written
    pub store: Arc<MemoryStorage>,
}

impl TestApp {
    pub async fn stored_keys(&self) -> Vec<String> {
        self.store.keys().await
    }
}

pub fn test_config(vars: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    vars.entry("STORAGE_BACKEND".to_string())
        .or_insert_with(|| "memory".to_string());
    vars.entry("THUMBNAIL_SIZE".to_string())
        .or_insert_with(|| "32x32".to_string());
    Config::from_vars(|key| vars.get(key).cloned()).unwrap()
}

/// Built-in `image` and `document` policies, 32x32 thumbnails.
pub fn setup_test_app() -> TestApp {
    let catalog = builtin_catalog(&test_config(&[])).unwrap();
    setup_with_catalog(catalog)
}

/// A catalog holding only the given policies.
pub fn setup_with_policies(policies: Vec<Arc<dyn Policy>>) -> TestApp {
    let mut catalog = PolicyCatalog::new();
    catalog.register_policies(policies).unwrap();
    setup_with_catalog(catalog)
}

pub fn setup_with_catalog(catalog: PolicyCatalog) -> TestApp {
    setup_with_hydrator(catalog, Hydrator::new(None))
}

/// Built-in policies, inbound content capped at `max_bytes`.
pub fn setup_with_upload_cap(max_bytes: u64) -> TestApp {
    let catalog = builtin_catalog(&test_config(&[])).unwrap();
    setup_with_hydrator(catalog, Hydrator::new(None).with_max_bytes(max_bytes))
}

pub fn setup_with_hydrator(catalog: PolicyCatalog, hydrator: Hydrator) -> TestApp {
    let store = Arc::new(MemoryStorage::new(SCHEME));
    let mut registry = StorageRegistry::new();
    registry.mount(SCHEME, store.clone()).unwrap();

    let catalog = Arc::new(catalog);
    let storage = Arc::new(registry);

    TestApp {
        filer: Filer::new(catalog.clone(), storage.clone(), hydrator.clone()),
        variator: Variator::new(catalog, storage.clone(), hydrator),
        storage,
        store,
    }
}
