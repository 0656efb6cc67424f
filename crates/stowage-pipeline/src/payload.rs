//! Inbound payloads and the entry adapters that produce them.
//!
//! A [`Payload`] carries a file's bytes (or where to find them) together with
//! whatever the client claimed about it. None of those claims are trusted.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use stowage_core::mime;
use stowage_core::{FileError, FileResult};
use tokio::io::AsyncRead;

/// Where the payload's bytes come from.
pub enum PayloadSource {
    Path(PathBuf),
    Buffer(Bytes),
    /// Single-pass reader, drained once during hydration
    Stream(Pin<Box<dyn AsyncRead + Send + Unpin>>),
}

impl fmt::Debug for PayloadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            PayloadSource::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
            PayloadSource::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Error code reported by the upload layer for a failed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadErrorCode {
    /// Exceeds the server-wide upload limit
    IniSize,
    /// Exceeds the limit declared by the form
    FormSize,
    Partial,
    NoFile,
    NoTmpDir,
    CantWrite,
    /// Stopped by an upload extension
    Extension,
}

impl UploadErrorCode {
    /// Map a numeric upload status. `0` means success and yields `None`, as
    /// does an unknown code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::IniSize),
            2 => Some(Self::FormSize),
            3 => Some(Self::Partial),
            4 => Some(Self::NoFile),
            6 => Some(Self::NoTmpDir),
            7 => Some(Self::CantWrite),
            8 => Some(Self::Extension),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::IniSize => 1,
            Self::FormSize => 2,
            Self::Partial => 3,
            Self::NoFile => 4,
            Self::NoTmpDir => 6,
            Self::CantWrite => 7,
            Self::Extension => 8,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::IniSize => "file exceeds the server upload limit",
            Self::FormSize => "file exceeds the form upload limit",
            Self::Partial => "file was only partially uploaded",
            Self::NoFile => "no file was uploaded",
            Self::NoTmpDir => "missing a temporary folder",
            Self::CantWrite => "failed to write file to disk",
            Self::Extension => "upload stopped by an extension",
        }
    }
}

impl fmt::Display for UploadErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.description(), self.code())
    }
}

/// Normalized inbound file: bytes or their location, plus untrusted claims.
#[derive(Debug)]
pub struct Payload {
    /// Client-declared file name, possibly with extension
    pub name: String,
    pub mime: Option<String>,
    pub size: Option<u64>,
    /// Explicit extension claim; wins over the one in `name`
    pub extension: Option<String>,
    pub source: PayloadSource,
    pub error: Option<UploadErrorCode>,
}

impl Payload {
    pub fn new(name: impl Into<String>, source: PayloadSource) -> Self {
        Self {
            name: name.into(),
            mime: None,
            size: None,
            extension: None,
            source,
            error: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn with_error(mut self, error: UploadErrorCode) -> Self {
        self.error = Some(error);
        self
    }
}

/// Entry adapter: anything that can describe itself as a [`Payload`].
#[async_trait]
pub trait IntoPayload: Send {
    async fn into_payload(self) -> FileResult<Payload>;
}

#[async_trait]
impl IntoPayload for Payload {
    async fn into_payload(self) -> FileResult<Payload> {
        Ok(self)
    }
}

/// A file already on local disk. Size is claimed from file metadata and the
/// media type from the extension.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: Option<String>,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
        }
    }

    /// Declare a name other than the file's own.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[async_trait]
impl IntoPayload for LocalFile {
    async fn into_payload(self) -> FileResult<Payload> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => {
                return Err(FileError::NotFound(format!(
                    "{} is not a regular file",
                    self.path.display()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileError::NotFound(self.path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let name = self.name.unwrap_or_else(|| {
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        });
        let claimed_mime = name
            .rsplit_once('.')
            .and_then(|(_, ext)| mime::for_extension(ext));

        let mut payload = Payload::new(name, PayloadSource::Path(self.path))
            .with_size(meta.len());
        if let Some(claimed) = claimed_mime {
            payload = payload.with_mime(claimed);
        }
        Ok(payload)
    }
}

/// A file received by an upload handler: a temp path plus client claims.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub temp_path: PathBuf,
    pub client_name: String,
    pub client_mime: Option<String>,
    pub client_size: Option<u64>,
    pub error: Option<UploadErrorCode>,
}

#[async_trait]
impl IntoPayload for UploadedFile {
    async fn into_payload(self) -> FileResult<Payload> {
        Ok(Payload {
            name: self.client_name,
            mime: self.client_mime,
            size: self.client_size,
            extension: None,
            source: PayloadSource::Path(self.temp_path),
            error: self.error,
        })
    }
}

/// A file held entirely in memory.
#[derive(Debug, Clone)]
pub struct InMemoryFile {
    pub name: String,
    pub bytes: Bytes,
    pub mime: Option<String>,
}

impl InMemoryFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

#[async_trait]
impl IntoPayload for InMemoryFile {
    async fn into_payload(self) -> FileResult<Payload> {
        let size = self.bytes.len() as u64;
        Ok(Payload {
            name: self.name,
            mime: self.mime,
            size: Some(size),
            extension: None,
            source: PayloadSource::Buffer(self.bytes),
            error: None,
        })
    }
}

/// A file arriving as an async byte stream.
pub struct StreamFile {
    pub name: String,
    pub reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    pub mime: Option<String>,
    pub size: Option<u64>,
}

impl StreamFile {
    pub fn new(name: impl Into<String>, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            name: name.into(),
            reader: Box::pin(reader),
            mime: None,
            size: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

#[async_trait]
impl IntoPayload for StreamFile {
    async fn into_payload(self) -> FileResult<Payload> {
        Ok(Payload {
            name: self.name,
            mime: self.mime,
            size: self.size,
            extension: None,
            source: PayloadSource::Stream(self.reader),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_error_codes() {
        assert_eq!(UploadErrorCode::from_code(0), None);
        assert_eq!(UploadErrorCode::from_code(3), Some(UploadErrorCode::Partial));
        assert_eq!(UploadErrorCode::from_code(5), None);
        assert_eq!(UploadErrorCode::CantWrite.code(), 7);
        assert_eq!(
            UploadErrorCode::IniSize.to_string(),
            "file exceeds the server upload limit (code 1)"
        );
    }

    #[tokio::test]
    async fn test_local_file_claims_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        tokio::fs::write(&path, b"%PDF-1.7").await.unwrap();

        let payload = LocalFile::new(&path).into_payload().await.unwrap();
        assert_eq!(payload.name, "report.pdf");
        assert_eq!(payload.mime.as_deref(), Some("application/pdf"));
        assert_eq!(payload.size, Some(8));
        assert!(matches!(payload.source, PayloadSource::Path(_)));
    }

    #[tokio::test]
    async fn test_local_file_missing() {
        let result = LocalFile::new("/definitely/not/here.txt").into_payload().await;
        assert!(matches!(result, Err(FileError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_in_memory_file_claims_size() {
        let payload = InMemoryFile::new("a.txt", "hello")
            .with_mime("text/plain")
            .into_payload()
            .await
            .unwrap();
        assert_eq!(payload.size, Some(5));
        assert_eq!(payload.mime.as_deref(), Some("text/plain"));
    }
}
