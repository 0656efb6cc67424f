//! Builds file contexts from inbound payloads and from storage stats.

use bytes::Bytes;
use std::path::PathBuf;
use stowage_core::constants::MAX_FILENAME_LEN;
use stowage_core::mime;
use stowage_core::{
    Evidence, FileContext, FileError, FileResult, FileSource, FileStats, ProofState,
    ProvedContext, UnprovedContext,
};
use stowage_storage::keys::is_reserved_name;
use tokio::io::AsyncReadExt;

use crate::payload::{Payload, PayloadSource};

#[derive(Debug, Clone, Default)]
pub struct Hydrator {
    tmp_dir: Option<PathBuf>,
    max_bytes: Option<u64>,
}

impl Hydrator {
    /// `tmp_dir` is where `ensure_path` writes in-memory content; the system
    /// temp dir when unset.
    pub fn new(tmp_dir: Option<PathBuf>) -> Self {
        Self {
            tmp_dir,
            max_bytes: None,
        }
    }

    /// Refuse inbound content larger than `max_bytes` before buffering it.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Unproved context from an inbound payload.
    ///
    /// Every payload value is copied as a claim. Streams are drained here since
    /// they cannot be read twice, but never past the upload cap. A payload
    /// carrying an upload error code is rejected outright.
    pub async fn from_payload(&self, payload: Payload) -> FileResult<UnprovedContext> {
        if let Some(code) = payload.error {
            return Err(FileError::Upload(format!(
                "'{}': {}",
                payload.name, code
            )));
        }

        let filename = sanitize_filename(&payload.name);
        let (name, extension) = split_name(&filename, payload.extension.as_deref());
        if let Some(size) = payload.size {
            self.check_size(&filename, size)?;
        }

        let source = match payload.source {
            PayloadSource::Path(path) => FileSource::from_path(path),
            PayloadSource::Buffer(bytes) => {
                self.check_size(&filename, bytes.len() as u64)?;
                FileSource::from_bytes(bytes)
            }
            PayloadSource::Stream(mut reader) => {
                let mut buffer = Vec::new();
                match self.max_bytes {
                    // One byte past the cap is enough to know it was exceeded
                    Some(max) => {
                        reader.take(max.saturating_add(1)).read_to_end(&mut buffer).await?;
                        self.check_size(&filename, buffer.len() as u64)?;
                    }
                    None => {
                        reader.read_to_end(&mut buffer).await?;
                    }
                }
                FileSource::from_bytes(Bytes::from(buffer))
            }
        };

        tracing::debug!(
            name = %name,
            extension = ?extension,
            claimed_mime = ?payload.mime,
            claimed_size = ?payload.size,
            "Hydrated payload"
        );

        Ok(FileContext::new(name, extension, source)
            .with_claimed_mime(payload.mime.map(|m| mime::normalize(&m)))
            .with_claimed_size(payload.size))
    }

    /// Merge verified evidence into an unproved context.
    pub fn prove(&self, context: UnprovedContext, evidence: Evidence) -> FileResult<ProvedContext> {
        context.prove(evidence)
    }

    /// Proved context for a file already held by a store. Stats come from the
    /// storage backend, so they are trusted as is. A missing extension is
    /// derived from the media type; fails when neither is usable.
    pub fn from_stats(&self, stats: &FileStats, source: FileSource) -> FileResult<ProvedContext> {
        if stats.name.is_empty() {
            return Err(FileError::invalid_state(format!(
                "cannot determine a file name from '{}'",
                stats.path
            )));
        }
        let extension = stored_extension(stats)?;

        let mut context = FileContext::trusted(
            stats.name.clone(),
            Some(extension),
            source,
            stats.mime.clone(),
            stats.size,
            stats.binary,
        );
        if let Some(modified) = stats.modified {
            context = context.with_metadata("modified", modified.to_rfc3339());
        }
        Ok(context)
    }

    /// Make sure the content is available as an in-memory buffer.
    pub async fn ensure_stream<S: ProofState>(
        &self,
        context: FileContext<S>,
    ) -> FileResult<FileContext<S>> {
        if context.bytes().is_some() {
            return Ok(context);
        }
        let path = context
            .source()
            .path()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| {
                FileError::invalid_state(format!(
                    "'{}' has neither a byte stream nor a path",
                    context.name()
                ))
            })?;

        let size = tokio::fs::metadata(&path).await?.len();
        self.check_size(&context.filename(), size)?;

        let data = tokio::fs::read(&path).await?;
        let source = context.source().clone().with_bytes(data);
        Ok(context.with_source(source))
    }

    fn check_size(&self, filename: &str, size: u64) -> FileResult<()> {
        match self.max_bytes {
            Some(max) if size > max => Err(FileError::validation(format!(
                "'{}': content exceeds the {} byte upload limit",
                filename, max
            ))),
            _ => Ok(()),
        }
    }

    /// Make sure the content is available at a local path, writing the buffer
    /// to a temp file when needed. The temp file lives as long as the source.
    pub async fn ensure_path<S: ProofState>(
        &self,
        context: FileContext<S>,
    ) -> FileResult<FileContext<S>> {
        if context.source().path().is_some() {
            return Ok(context);
        }
        let bytes = context.bytes().cloned().ok_or_else(|| {
            FileError::invalid_state(format!(
                "'{}' has neither a byte stream nor a path",
                context.name()
            ))
        })?;

        let tmp_dir = self.tmp_dir.clone().unwrap_or_else(std::env::temp_dir);
        let suffix = context
            .extension()
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();

        let temp = tokio::task::spawn_blocking(move || -> std::io::Result<tempfile::TempPath> {
            std::fs::create_dir_all(&tmp_dir)?;
            let mut file = tempfile::Builder::new()
                .prefix("stowage-")
                .suffix(&suffix)
                .tempfile_in(&tmp_dir)?;
            std::io::Write::write_all(&mut file, &bytes)?;
            file.as_file().sync_all()?;
            Ok(file.into_temp_path())
        })
        .await
        .map_err(|e| FileError::from(anyhow::anyhow!("temp file task failed: {}", e)))??;

        let source = context.source().clone().with_temp_path(temp);
        Ok(context.with_source(source))
    }
}

/// Extension of a stored file: the one in its name, else the canonical one
/// for its media type.
pub(crate) fn stored_extension(stats: &FileStats) -> FileResult<String> {
    stats
        .extension
        .clone()
        .filter(|ext| !ext.is_empty())
        .or_else(|| mime::extension_for(&stats.mime).map(str::to_string))
        .ok_or_else(|| {
            FileError::invalid_state(format!(
                "cannot determine an extension for '{}'",
                stats.path
            ))
        })
}

/// Reduce a client-declared file name to something safe to store.
///
/// Directory components are dropped, characters outside `[A-Za-z0-9._-]`
/// become `_`, and the result is capped at 255 characters. Reserved device
/// names get a `_` prefix; names with nothing left become `file`.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename)
        .trim();

    let s: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LEN)
        .collect();
    let s = s.trim_start_matches('.').to_string();

    if s.trim_matches(|c: char| c == '_' || c == '.').is_empty() {
        "file".to_string()
    } else if is_reserved_name(&s) {
        format!("_{}", s)
    } else {
        s
    }
}

/// Split a file name into base name and extension.
///
/// An explicit extension wins: if the name already ends with it the base is
/// the stem, otherwise the whole name is kept as base. Without one, the text
/// after the last dot is the extension. Extensions are lower-cased.
pub(crate) fn split_name(filename: &str, explicit: Option<&str>) -> (String, Option<String>) {
    let own = filename
        .rsplit_once('.')
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty());

    let explicit = explicit
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty());

    match (explicit, own) {
        (Some(ext), Some((stem, own_ext))) if own_ext.eq_ignore_ascii_case(&ext) => {
            (stem.to_string(), Some(ext))
        }
        (Some(ext), _) => (filename.to_string(), Some(ext)),
        (None, Some((stem, own_ext))) => (stem.to_string(), Some(own_ext.to_ascii_lowercase())),
        (None, None) => (filename.to_string(), None),
    }
}
