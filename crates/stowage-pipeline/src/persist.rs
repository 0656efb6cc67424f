//! Final write step shared by the Filer and the Variator.

use std::time::Instant;
use stowage_core::{FileError, FileRecord, FileResult, FileUri, ProvedContext};
use stowage_storage::StorageRegistry;

use crate::hydrator::Hydrator;

/// Write a proved context's bytes at `uri` and describe the result.
///
/// Only proved contexts reach this point. The bytes are materialized and
/// hashed first, so a failure before the write leaves the store untouched.
pub(crate) async fn persist(
    storage: &StorageRegistry,
    hydrator: &Hydrator,
    context: ProvedContext,
    uri: &FileUri,
) -> FileResult<FileRecord> {
    let start = Instant::now();
    let uri = storage.normalize_uri(uri)?;
    let context = hydrator.ensure_stream(context).await?.ensure_hash()?;
    let data = context.bytes().cloned().ok_or_else(|| {
        FileError::invalid_state(format!("'{}' has no byte stream to write", uri))
    })?;

    let written = storage.write(&uri, data).await?;
    if written != context.size() {
        return Err(FileError::Storage(format!(
            "wrote {} bytes to {} but the file has {} bytes",
            written,
            uri,
            context.size()
        )));
    }

    let record = FileRecord::from_context(&context, &uri, storage.public_url(&uri))?;
    tracing::debug!(
        uri = %record.uri,
        mime = %record.mime,
        size_bytes = record.size,
        duration_ms = start.elapsed().as_millis() as u64,
        "File persisted"
    );
    Ok(record)
}
