//! Persisted artifact records
//!
//! Records are only built from proved contexts:
//!
//! ```compile_fail
//! use stowage_core::{FileContext, FileRecord, FileSource, FileUri};
//!
//! let unproved = FileContext::new("photo", Some("jpg".to_string()), FileSource::from_bytes("x"));
//! let uri: FileUri = "uploads://photo.jpg".parse().unwrap();
//! let _ = FileRecord::from_context(&unproved, &uri, None);
//! ```

use serde::{Deserialize, Serialize};

use crate::context::ProvedContext;
use crate::error::{FileError, FileResult};
use crate::uri::FileUri;

/// An ingested file as persisted in a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub store: String,
    /// Store-relative key
    pub path: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub mime: String,
    pub extension: Option<String>,
    pub size: u64,
    /// SHA-256, hex
    pub hash: String,
    pub name: String,
}

impl FileRecord {
    pub fn from_context(
        context: &ProvedContext,
        uri: &FileUri,
        url: Option<String>,
    ) -> FileResult<Self> {
        let hash = context.hash().ok_or_else(|| {
            FileError::invalid_state(format!(
                "cannot record '{}': content hash is not set",
                uri
            ))
        })?;

        Ok(Self {
            store: uri.store().to_string(),
            path: uri.key(),
            uri: uri.to_string(),
            url,
            mime: context.mime().to_string(),
            extension: context.extension().map(str::to_string),
            size: context.size(),
            hash: hash.to_string(),
            name: context.filename(),
        })
    }

    /// Parse the canonical URI back into its parts.
    pub fn file_uri(&self) -> FileResult<FileUri> {
        self.uri.parse()
    }
}

/// A derived variant of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRecord {
    #[serde(flatten)]
    pub file: FileRecord,
    /// Suffix of the profile that produced this variant
    #[serde(rename = "type")]
    pub variant: String,
}

impl VariantRecord {
    pub fn from_context(
        context: &ProvedContext,
        uri: &FileUri,
        url: Option<String>,
        variant: impl Into<String>,
    ) -> FileResult<Self> {
        Ok(Self {
            file: FileRecord::from_context(context, uri, url)?,
            variant: variant.into(),
        })
    }

    pub fn uri(&self) -> &str {
        &self.file.uri
    }
}
