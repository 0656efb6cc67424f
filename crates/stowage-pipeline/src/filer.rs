//! Ingestion: payload → proved context → policy stages → stored file.

use std::sync::Arc;
use std::time::Instant;
use stowage_core::constants::OCTET_STREAM;
use stowage_core::{mime, FileError, FileRecord, FileResult, FileUri};
use stowage_storage::StorageRegistry;
use uuid::Uuid;

use crate::catalog::PolicyCatalog;
use crate::evaluator::Evaluator;
use crate::hydrator::{sanitize_filename, Hydrator};
use crate::payload::IntoPayload;
use crate::persist::persist;
use crate::policy::{Capability, Naming, PolicyOptions};
use crate::strategy::matches_pattern;

/// Saves new files according to the policy resolved for their scheme and
/// claimed media type.
#[derive(Debug, Clone)]
pub struct Filer {
    catalog: Arc<PolicyCatalog>,
    storage: Arc<StorageRegistry>,
    hydrator: Hydrator,
}

impl Filer {
    pub fn new(
        catalog: Arc<PolicyCatalog>,
        storage: Arc<StorageRegistry>,
        hydrator: Hydrator,
    ) -> Self {
        Self {
            catalog,
            storage,
            hydrator,
        }
    }

    /// Ingest `input` into the store mounted for `scheme`.
    ///
    /// Phases: hydrate → resolve ingress policy → prove → filters and
    /// transformers → persist. Any phase failing aborts the call; nothing is
    /// written unless every earlier phase succeeded.
    ///
    /// An existing key is never replaced unless the `overwrite` option is
    /// `true`. Names of the form `{stem}_{suffix}` are where the Variator
    /// writes variants, and regenerating a variant replaces that key.
    #[tracing::instrument(skip(self, input, options))]
    pub async fn save<I: IntoPayload>(
        &self,
        scheme: &str,
        input: I,
        options: PolicyOptions,
    ) -> FileResult<FileRecord> {
        let start = Instant::now();
        if !self.storage.contains(scheme) {
            return Err(FileError::configuration(format!(
                "no store is mounted for scheme '{}'",
                scheme
            )));
        }

        // 1. Hydrate: payload claims become an unproved context. A type
        // inferred from the extension is recorded as a claim and proved too.
        let payload = input.into_payload().await?;
        let context = self.hydrator.from_payload(payload).await?;
        let inferred = match context.claimed_mime() {
            Some(_) => None,
            None => context.extension().and_then(mime::for_extension),
        };
        let context = match inferred {
            Some(inferred) => context.with_claimed_mime(Some(inferred.to_string())),
            None => context,
        };
        let claimed_mime = context.claimed_mime().unwrap_or(OCTET_STREAM).to_string();

        // 2. Resolve the ingress policy from the claim
        let resolved = self
            .catalog
            .resolve(Capability::Ingress, scheme, &claimed_mime, options)?;
        let ingress = resolved.ingress()?;
        let strategy = ingress.strategy(&claimed_mime);
        let pipeline = ingress.pipeline(resolved.options());
        let path = ingress.path(resolved.options());
        let naming = ingress.naming();
        let policy_name = resolved.name().to_string();
        let media_types = resolved.policy().media_types().to_vec();

        // 3 + 4. Prove against the real bytes, then run the policy's stages.
        // Both can decode or re-encode content, so they run on the blocking pool.
        let context = self.hydrator.ensure_stream(context).await?;
        let context = tokio::task::spawn_blocking(move || {
            let proved = strategy.prove(context)?;
            tracing::debug!(
                strategy = strategy.name(),
                mime = %proved.mime(),
                size_bytes = proved.size(),
                "File proved"
            );
            // The policy was picked from a claim; the proved type must fit it too
            if !media_types.iter().any(|p| matches_pattern(p, proved.mime())) {
                return Err(FileError::validation(format!(
                    "'{}': media type {} is not handled by policy '{}'",
                    proved.filename(),
                    proved.mime(),
                    policy_name
                )));
            }
            Evaluator::evaluate(&pipeline, proved)
        })
        .await
        .map_err(|e| FileError::from(anyhow::anyhow!("ingestion task failed: {}", e)))??;

        // 5. Persist under the policy path
        let context = match resolved.options().get_str("name") {
            Some(name) => context.with_name(sanitize_name(name)),
            None if naming == Naming::Unique => context.with_name(Uuid::new_v4().to_string()),
            None => context,
        };
        let uri = FileUri::new(scheme, Some(path.as_str()), &context.filename())?;
        let overwrite = resolved.options().get_bool("overwrite").unwrap_or(false);
        if !overwrite && self.storage.exists(&uri).await? {
            return Err(FileError::AlreadyExists(format!(
                "{} already exists; pass the 'overwrite' option to replace it",
                uri
            )));
        }
        let record = persist(&self.storage, &self.hydrator, context, &uri).await?;

        tracing::info!(
            uri = %record.uri,
            policy = %resolved.name(),
            mime = %record.mime,
            size_bytes = record.size,
            duration_ms = start.elapsed().as_millis() as u64,
            "File saved"
        );
        Ok(record)
    }
}

/// A `name` option names the stored base name; it goes through the same
/// sanitizer as declared names, minus any extension it carries.
fn sanitize_name(name: &str) -> String {
    let name = sanitize_filename(name);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}
