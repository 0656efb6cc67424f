//! Error types module
//!
//! All pipeline failures are unified under [`FileError`]. Variants fall into
//! the classes the pipeline distinguishes:
//!
//! - configuration errors (bad policy registration, nothing resolves a selector)
//! - validation failures (a strategy or filter rejected the file)
//! - state-invariant violations (programmer errors)
//! - addressing errors (malformed URIs)
//! - storage and I/O failures
//!
//! No phase swallows an error: each either yields a valid next-stage value or
//! aborts the whole save/generate call.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Failure class of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Validation,
    StateInvariant,
    Addressing,
    Storage,
    Internal,
}

/// Metadata for error responses - defines how an error should be presented
/// by whichever facade exposes the pipeline.
pub trait ErrorMetadata {
    /// Failure class
    fn error_kind(&self) -> ErrorKind;

    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "VALIDATION_FAILED")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No policy resolves selector '{0}'")]
    PolicyNotFound(String),

    /// Rejection message from a strategy or filter, surfaced verbatim.
    #[error("{0}")]
    Validation(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {message}")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Result type for pipeline operations
pub type FileResult<T> = Result<T, FileError>;

impl FileError {
    pub fn validation(message: impl Into<String>) -> Self {
        FileError::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        FileError::Configuration(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        FileError::InvalidState(message.into())
    }

    pub fn invalid_uri(message: impl Into<String>) -> Self {
        FileError::InvalidUri(message.into())
    }

    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &'static str {
        match self {
            FileError::Configuration(_) => "Configuration",
            FileError::PolicyNotFound(_) => "PolicyNotFound",
            FileError::Validation(_) => "Validation",
            FileError::Upload(_) => "Upload",
            FileError::InvalidState(_) => "InvalidState",
            FileError::InvalidUri(_) => "InvalidUri",
            FileError::NotFound(_) => "NotFound",
            FileError::AlreadyExists(_) => "AlreadyExists",
            FileError::Storage(_) => "Storage",
            FileError::Io(_) => "Io",
            FileError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl From<anyhow::Error> for FileError {
    fn from(err: anyhow::Error) -> Self {
        FileError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

/// Static metadata for each variant: (kind, http_status, error_code, recoverable, log_level).
fn file_error_static_metadata(
    err: &FileError,
) -> (ErrorKind, u16, &'static str, bool, LogLevel) {
    match err {
        FileError::Configuration(_) => (
            ErrorKind::Configuration,
            500,
            "CONFIGURATION_ERROR",
            false,
            LogLevel::Error,
        ),
        FileError::PolicyNotFound(_) => (
            ErrorKind::Configuration,
            415,
            "POLICY_NOT_FOUND",
            false,
            LogLevel::Warn,
        ),
        FileError::Validation(_) => (
            ErrorKind::Validation,
            422,
            "VALIDATION_FAILED",
            false,
            LogLevel::Debug,
        ),
        FileError::Upload(_) => (
            ErrorKind::Validation,
            400,
            "UPLOAD_FAILED",
            false,
            LogLevel::Debug,
        ),
        FileError::InvalidState(_) => (
            ErrorKind::StateInvariant,
            500,
            "INVALID_STATE",
            false,
            LogLevel::Error,
        ),
        FileError::InvalidUri(_) => (
            ErrorKind::Addressing,
            400,
            "INVALID_URI",
            false,
            LogLevel::Debug,
        ),
        FileError::NotFound(_) => (
            ErrorKind::Addressing,
            404,
            "NOT_FOUND",
            false,
            LogLevel::Debug,
        ),
        FileError::AlreadyExists(_) => (
            ErrorKind::Addressing,
            409,
            "ALREADY_EXISTS",
            false,
            LogLevel::Debug,
        ),
        FileError::Storage(_) => (
            ErrorKind::Storage,
            500,
            "STORAGE_ERROR",
            true,
            LogLevel::Error,
        ),
        FileError::Io(_) => (ErrorKind::Storage, 500, "IO_ERROR", true, LogLevel::Error),
        FileError::InternalWithSource { .. } => (
            ErrorKind::Internal,
            500,
            "INTERNAL_ERROR",
            true,
            LogLevel::Error,
        ),
    }
}

impl ErrorMetadata for FileError {
    fn error_kind(&self) -> ErrorKind {
        file_error_static_metadata(self).0
    }

    fn http_status_code(&self) -> u16 {
        file_error_static_metadata(self).1
    }

    fn error_code(&self) -> &'static str {
        file_error_static_metadata(self).2
    }

    fn is_recoverable(&self) -> bool {
        file_error_static_metadata(self).3
    }

    fn log_level(&self) -> LogLevel {
        file_error_static_metadata(self).4
    }

    fn client_message(&self) -> String {
        match self {
            FileError::Validation(msg) => msg.clone(),
            FileError::Upload(msg) => msg.clone(),
            FileError::InvalidUri(msg) => format!("Invalid URI: {}", msg),
            FileError::NotFound(msg) | FileError::AlreadyExists(msg) => msg.clone(),
            FileError::PolicyNotFound(_) => "Unsupported file type".to_string(),
            FileError::Storage(_) | FileError::Io(_) => "Failed to access storage".to_string(),
            FileError::Configuration(_)
            | FileError::InvalidState(_)
            | FileError::InternalWithSource { .. } => "Internal server error".to_string(),
        }
    }
}
