//! Stowage Core Library
//!
//! This crate provides the domain types shared by every Stowage component:
//! the file context that travels through the ingestion pipeline, the URI
//! addressing scheme, persisted records, media type detection, error types
//! and configuration.

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod mime;
pub mod record;
pub mod storage_types;
pub mod uri;

// Re-export commonly used types
pub use config::{Config, DocumentPolicyConfig, ImagePolicyConfig, StorageConfig};
pub use context::{
    content_hash, Evidence, FileContext, FileSource, MetaValue, ProofState, Proved, ProvedContext,
    Unproved, UnprovedContext,
};
pub use error::{ErrorKind, ErrorMetadata, FileError, FileResult, LogLevel};
pub use record::{FileRecord, VariantRecord};
pub use storage_types::{FileStats, StorageBackend};
pub use uri::{FileUri, IntoFileUri};
