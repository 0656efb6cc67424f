//! Stowage Pipeline Library
//!
//! Orchestration of file ingestion and variant derivation:
//!
//! - [`Hydrator`] turns inbound payloads (paths, buffers, streams) into
//!   unproved file contexts, and storage stats into proved ones.
//! - [`ProvingStrategy`] implementations check claims against real bytes.
//! - [`PolicyCatalog`] resolves a policy by scheme and media type.
//! - [`Evaluator`] runs a policy's filters (fail-fast) and transformers
//!   (each output feeding the next).
//! - [`Filer`] saves a new file; [`Variator`] derives variants of a stored one.

pub mod catalog;
pub mod evaluator;
pub mod filer;
pub mod filters;
pub mod hydrator;
#[cfg(feature = "image")]
pub mod image;
pub mod payload;
pub mod policies;
pub mod policy;
pub mod strategy;
pub mod transformers;
pub mod variator;

mod persist;

// Re-export commonly used types
pub use catalog::{PolicyCatalog, PolicyFactory, PolicyRef, ResolvedPolicy};
pub use evaluator::{Evaluator, Filter, Pipeline, Stage, Transformer};
pub use filer::Filer;
pub use hydrator::{sanitize_filename, Hydrator};
pub use payload::{
    InMemoryFile, IntoPayload, LocalFile, Payload, PayloadSource, StreamFile, UploadErrorCode,
    UploadedFile,
};
pub use policies::builtin_catalog;
pub use policy::{
    Capability, IngressPolicy, Naming, Policy, PolicyOptions, StaticIngress, StaticPolicy,
    StaticVariants, VariantExtension, VariantProfile, VariantsPolicy,
};
#[cfg(feature = "image")]
pub use strategy::ImageStrategy;
pub use strategy::{ProvingStrategy, SignatureStrategy};
pub use variator::Variator;
