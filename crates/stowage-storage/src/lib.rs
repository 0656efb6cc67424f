//! Stowage Storage Library
//!
//! This crate provides the storage collaborator of the ingestion pipeline:
//! the [`Storage`] trait, local filesystem and in-memory backends, and the
//! [`StorageRegistry`] that maps URI schemes to mounted stores.
//!
//! # Storage key format
//!
//! Keys are store-relative, `/`-separated paths (`images/thumbs/photo_thumb.jpg`).
//! Keys must not be absolute, contain `..` segments, null bytes or reserved
//! device names. Validation is centralized in the `keys` module so every
//! backend applies the same rules.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
pub mod registry;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use registry::StorageRegistry;
pub use stowage_core::StorageBackend;
pub use traits::{ObjectMetadata, Storage, StorageError, StorageResult};
