//! File context carried through the ingestion pipeline
//!
//! A [`FileContext`] is either unproved (its values are claims copied from an
//! inbound payload) or proved (every value was checked against the actual
//! bytes, or came from trusted storage metadata). The two states are distinct
//! types. `prove` only exists on `FileContext<Unproved>`, and records can only
//! be built from `FileContext<Proved>`:
//!
//! ```compile_fail
//! use stowage_core::{Evidence, FileContext, FileSource};
//!
//! let proved = FileContext::trusted(
//!     "notes",
//!     Some("txt".to_string()),
//!     FileSource::from_bytes("hello"),
//!     "text/plain",
//!     5,
//!     false,
//! );
//! // A proved context can never be proved again.
//! let _ = proved.prove(Evidence::new());
//! ```
//!
//! Every `with_*` method consumes the context and returns a new one; holders
//! of a clone never observe the change.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;

use crate::error::{FileError, FileResult};
use crate::mime;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Unproved {}
    impl Sealed for super::Proved {}
}

/// Proof state of a [`FileContext`]. Implemented only by [`Unproved`] and [`Proved`].
pub trait ProofState: sealed::Sealed + Clone + fmt::Debug + Send + Sync + 'static {
    const PROVED: bool;
}

/// Untrusted claims copied from an inbound payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unproved {
    mime: Option<String>,
    size: Option<u64>,
    binary: Option<bool>,
}

/// Values verified against real content.
#[derive(Debug, Clone, PartialEq)]
pub struct Proved {
    mime: String,
    size: u64,
    binary: bool,
}

impl ProofState for Unproved {
    const PROVED: bool = false;
}

impl ProofState for Proved {
    const PROVED: bool = true;
}

pub type UnprovedContext = FileContext<Unproved>;
pub type ProvedContext = FileContext<Proved>;

/// Scalar metadata value (inspection results such as pixel dimensions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetaValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Int(v) => Some(*v as f64),
            MetaValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Bool(v) => write!(f, "{}", v),
            MetaValue::Int(v) => write!(f, "{}", v),
            MetaValue::Float(v) => write!(f, "{}", v),
            MetaValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<i32> for MetaValue {
    fn from(v: i32) -> Self {
        MetaValue::Int(v.into())
    }
}

impl From<u32> for MetaValue {
    fn from(v: u32) -> Self {
        MetaValue::Int(v.into())
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

/// Where a file's bytes can be read from: an in-memory buffer, a local path,
/// or both.
///
/// `Bytes` clones share the same buffer, so every clone reads from the start.
/// A temp path created for the file is removed when the last clone drops.
#[derive(Clone, Default)]
pub struct FileSource {
    path: Option<PathBuf>,
    bytes: Option<Bytes>,
    temp: Option<Arc<TempPath>>,
}

impl FileSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: Some(bytes.into()),
            ..Self::default()
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        self.bytes.as_ref()
    }

    /// At least one representation is present.
    pub fn is_resolvable(&self) -> bool {
        self.path.is_some() || self.bytes.is_some()
    }

    pub fn with_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.bytes = Some(bytes.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self.temp = None;
        self
    }

    /// Use a temp file as the path representation, keeping it alive for as
    /// long as any clone of this source exists.
    pub fn with_temp_path(mut self, temp: TempPath) -> Self {
        self.path = Some(temp.to_path_buf());
        self.temp = Some(Arc::new(temp));
        self
    }

    /// Merge `overrides` over `self`; values present in `overrides` win.
    fn merge(self, overrides: FileSource) -> FileSource {
        let (path, temp) = if overrides.path.is_some() {
            (overrides.path, overrides.temp)
        } else {
            (self.path, self.temp)
        };
        FileSource {
            path,
            temp,
            bytes: overrides.bytes.or(self.bytes),
        }
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSource")
            .field("path", &self.path)
            .field("bytes_len", &self.bytes.as_ref().map(|b| b.len()))
            .field("temp", &self.temp.is_some())
            .finish()
    }
}

/// Verified values handed to [`FileContext::prove`]. Unset fields fall back to
/// the context's own values.
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub mime: Option<String>,
    pub extension: Option<String>,
    pub size: Option<u64>,
    pub binary: Option<bool>,
    pub hash: Option<String>,
    pub name: Option<String>,
    pub source: Option<FileSource>,
    pub metadata: BTreeMap<String, MetaValue>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_binary(mut self, binary: bool) -> Self {
        self.binary = Some(binary);
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_source(mut self, source: FileSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A file's identity and metadata as it moves through the pipeline.
#[derive(Debug, Clone)]
pub struct FileContext<S: ProofState> {
    source: FileSource,
    name: String,
    extension: Option<String>,
    hash: Option<String>,
    metadata: BTreeMap<String, MetaValue>,
    state: S,
}

impl<S: ProofState> FileContext<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// `name.extension`, or `name` alone when there is no extension.
    pub fn filename(&self) -> String {
        match self.extension() {
            Some(ext) if !ext.is_empty() => format!("{}.{}", self.name, ext),
            _ => self.name.clone(),
        }
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        self.source.bytes()
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, MetaValue> {
        &self.metadata
    }

    pub fn meta(&self, key: &str) -> Option<&MetaValue> {
        self.metadata.get(key)
    }

    pub fn is_proved(&self) -> bool {
        S::PROVED
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_extension(mut self, extension: Option<String>) -> Self {
        self.extension = extension;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace the byte source. Proved-ness is unchanged, so callers must only
    /// swap in another representation of the same content.
    pub fn with_source(mut self, source: FileSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }
}

impl FileContext<Unproved> {
    pub fn new(name: impl Into<String>, extension: Option<String>, source: FileSource) -> Self {
        Self {
            source,
            name: name.into(),
            extension,
            hash: None,
            metadata: BTreeMap::new(),
            state: Unproved::default(),
        }
    }

    pub fn claimed_mime(&self) -> Option<&str> {
        self.state.mime.as_deref()
    }

    pub fn claimed_size(&self) -> Option<u64> {
        self.state.size
    }

    pub fn claimed_binary(&self) -> Option<bool> {
        self.state.binary
    }

    pub fn with_claimed_mime(mut self, mime: Option<String>) -> Self {
        self.state.mime = mime;
        self
    }

    pub fn with_claimed_size(mut self, size: Option<u64>) -> Self {
        self.state.size = size;
        self
    }

    pub fn with_claimed_binary(mut self, binary: Option<bool>) -> Self {
        self.state.binary = binary;
        self
    }

    /// Turn claims into a proved context.
    ///
    /// `evidence` values override the context's own. Fails when neither a byte
    /// buffer nor a path is resolvable after merging, or when media type, size
    /// or the binary flag is still unset.
    pub fn prove(self, evidence: Evidence) -> FileResult<ProvedContext> {
        let source = match evidence.source {
            Some(overrides) => self.source.merge(overrides),
            None => self.source,
        };
        if !source.is_resolvable() {
            return Err(FileError::invalid_state(format!(
                "cannot prove '{}': neither a byte stream nor a path is resolvable",
                self.name
            )));
        }

        let mime = evidence
            .mime
            .or(self.state.mime)
            .map(|m| mime::normalize(&m))
            .ok_or_else(|| missing_field(&self.name, "media type"))?;
        let size = evidence
            .size
            .or(self.state.size)
            .ok_or_else(|| missing_field(&self.name, "size"))?;
        let binary = evidence
            .binary
            .or(self.state.binary)
            .ok_or_else(|| missing_field(&self.name, "binary flag"))?;

        let mut metadata = self.metadata;
        metadata.extend(evidence.metadata);

        Ok(FileContext {
            source,
            name: evidence.name.unwrap_or(self.name),
            extension: evidence.extension.or(self.extension),
            hash: evidence.hash.or(self.hash),
            metadata,
            state: Proved { mime, size, binary },
        })
    }
}

fn missing_field(name: &str, field: &str) -> FileError {
    FileError::invalid_state(format!("cannot prove '{}': {} is not set", name, field))
}

impl FileContext<Proved> {
    /// Build a proved context from trusted metadata (a file already held by a
    /// storage backend), bypassing claim verification.
    pub fn trusted(
        name: impl Into<String>,
        extension: Option<String>,
        source: FileSource,
        mime: impl Into<String>,
        size: u64,
        binary: bool,
    ) -> Self {
        Self {
            source,
            name: name.into(),
            extension,
            hash: None,
            metadata: BTreeMap::new(),
            state: Proved {
                mime: mime::normalize(&mime.into()),
                size,
                binary,
            },
        }
    }

    pub fn mime(&self) -> &str {
        &self.state.mime
    }

    pub fn size(&self) -> u64 {
        self.state.size
    }

    pub fn binary(&self) -> bool {
        self.state.binary
    }

    /// Replace the content with re-encoded bytes.
    ///
    /// Size and the binary flag are measured from `bytes`; the hash is cleared
    /// and any path representation dropped since it no longer matches.
    pub fn with_content(
        mut self,
        bytes: impl Into<Bytes>,
        mime: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        let bytes = bytes.into();
        self.state = Proved {
            mime: mime::normalize(&mime.into()),
            size: bytes.len() as u64,
            binary: mime::is_binary(&bytes),
        };
        self.source = FileSource::from_bytes(bytes);
        self.extension = Some(extension.into());
        self.hash = None;
        self
    }

    /// Fill the SHA-256 content hash if it is not set yet.
    pub fn ensure_hash(self) -> FileResult<Self> {
        if self.hash.is_some() {
            return Ok(self);
        }
        let hash = match self.source.bytes() {
            Some(bytes) => content_hash(bytes),
            None => {
                return Err(FileError::invalid_state(format!(
                    "cannot hash '{}': byte stream is not materialized",
                    self.name
                )))
            }
        };
        Ok(self.with_hash(hash))
    }
}

/// Hex-encoded SHA-256 of `data`.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unproved() -> UnprovedContext {
        FileContext::new(
            "photo",
            Some("jpg".to_string()),
            FileSource::from_bytes(&b"\xFF\xD8\xFFdata"[..]),
        )
    }

    #[test]
    fn test_prove_with_full_evidence() {
        let ctx = unproved().with_claimed_mime(Some("image/jpg".to_string()));
        let proved = ctx
            .prove(
                Evidence::new()
                    .with_mime("image/jpeg")
                    .with_size(7)
                    .with_binary(true),
            )
            .unwrap();

        assert!(proved.is_proved());
        assert_eq!(proved.mime(), "image/jpeg");
        assert_eq!(proved.size(), 7);
        assert!(proved.binary());
        assert_eq!(proved.filename(), "photo.jpg");
    }

    #[test]
    fn test_prove_falls_back_to_claims() {
        let ctx = unproved()
            .with_claimed_mime(Some("Image/JPEG".to_string()))
            .with_claimed_size(Some(7))
            .with_claimed_binary(Some(true));
        let proved = ctx.prove(Evidence::new()).unwrap();
        assert_eq!(proved.mime(), "image/jpeg");
        assert_eq!(proved.size(), 7);
    }

    #[test]
    fn test_prove_fails_without_mime() {
        let err = unproved()
            .prove(Evidence::new().with_size(7).with_binary(true))
            .unwrap_err();
        assert!(matches!(err, FileError::InvalidState(ref m) if m.contains("media type")));
    }

    #[test]
    fn test_prove_fails_without_size() {
        let err = unproved()
            .prove(Evidence::new().with_mime("image/jpeg").with_binary(true))
            .unwrap_err();
        assert!(matches!(err, FileError::InvalidState(ref m) if m.contains("size")));
    }

    #[test]
    fn test_prove_fails_without_binary_flag() {
        let err = unproved()
            .prove(Evidence::new().with_mime("image/jpeg").with_size(7))
            .unwrap_err();
        assert!(matches!(err, FileError::InvalidState(ref m) if m.contains("binary")));
    }

    #[test]
    fn test_prove_fails_without_source() {
        let ctx = FileContext::new("ghost", None, FileSource::default());
        let err = ctx
            .prove(
                Evidence::new()
                    .with_mime("text/plain")
                    .with_size(0)
                    .with_binary(false),
            )
            .unwrap_err();
        assert!(matches!(err, FileError::InvalidState(_)));
    }

    #[test]
    fn test_prove_accepts_source_from_evidence() {
        let ctx = FileContext::new("late", None, FileSource::default());
        let proved = ctx
            .prove(
                Evidence::new()
                    .with_mime("text/plain")
                    .with_size(2)
                    .with_binary(false)
                    .with_source(FileSource::from_bytes("hi")),
            )
            .unwrap();
        assert_eq!(proved.bytes().unwrap().as_ref(), b"hi");
    }

    #[test]
    fn test_prove_merges_identity_and_metadata() {
        let ctx = unproved().with_metadata("origin", "upload");
        let proved = ctx
            .prove(
                Evidence::new()
                    .with_mime("image/jpeg")
                    .with_size(7)
                    .with_binary(true)
                    .with_name("renamed")
                    .with_extension("jpeg")
                    .with_hash("abc")
                    .with_metadata("width", 10),
            )
            .unwrap();
        assert_eq!(proved.filename(), "renamed.jpeg");
        assert_eq!(proved.hash(), Some("abc"));
        assert_eq!(proved.meta("origin").and_then(|v| v.as_str()), Some("upload"));
        assert_eq!(proved.meta("width").and_then(|v| v.as_i64()), Some(10));
    }

    #[test]
    fn test_with_methods_do_not_affect_clones() {
        let original = unproved();
        let changed = original.clone().with_name("other").with_metadata("x", 1);
        assert_eq!(original.name(), "photo");
        assert!(original.meta("x").is_none());
        assert_eq!(changed.name(), "other");
    }

    #[test]
    fn test_with_content_remeasures() {
        let proved = FileContext::trusted(
            "doc",
            Some("txt".to_string()),
            FileSource::from_path("/tmp/doc.txt").with_bytes("hello"),
            "text/plain",
            5,
            false,
        )
        .with_hash("stale");

        let reencoded = proved.with_content(vec![0u8, 1, 2], "application/octet-stream", "bin");
        assert_eq!(reencoded.size(), 3);
        assert!(reencoded.binary());
        assert_eq!(reencoded.hash(), None);
        assert!(reencoded.source().path().is_none());
        assert_eq!(reencoded.filename(), "doc.bin");
    }

    #[test]
    fn test_ensure_hash() {
        let proved = FileContext::trusted(
            "a",
            None,
            FileSource::from_bytes("abc"),
            "text/plain",
            3,
            false,
        )
        .ensure_hash()
        .unwrap();
        assert_eq!(
            proved.hash(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_ensure_hash_requires_bytes() {
        let proved = FileContext::trusted(
            "a",
            None,
            FileSource::from_path("/nowhere"),
            "text/plain",
            3,
            false,
        );
        assert!(matches!(
            proved.ensure_hash(),
            Err(FileError::InvalidState(_))
        ));
    }

    #[test]
    fn test_temp_path_lives_while_cloned() {
        let temp = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let path = temp.to_path_buf();
        let source = FileSource::default().with_temp_path(temp);
        let clone = source.clone();
        drop(source);
        assert!(path.exists());
        drop(clone);
        assert!(!path.exists());
    }

    #[test]
    fn test_meta_value_serializes_untagged() {
        let json = serde_json::to_string(&MetaValue::from(42)).unwrap();
        assert_eq!(json, "42");
        let json = serde_json::to_string(&MetaValue::from("x")).unwrap();
        assert_eq!(json, "\"x\"");
    }
}
